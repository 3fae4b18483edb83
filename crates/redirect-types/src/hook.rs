//! Inspection hook identifiers and records.

use crate::{ElementId, FailurePolicyType, InspectionPortElement, ParseError, TagEncapsulationType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque identifier of an installed inspection hook.
///
/// For SFC drivers the hook id is the inspection port's element id; other
/// drivers assign their own identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HookId(String);

impl HookId {
    pub fn new(id: impl Into<String>) -> Result<Self, ParseError> {
        let id = id.into();
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(ParseError::InvalidHookId(id));
        }
        Ok(HookId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<ElementId> for HookId {
    fn from(id: ElementId) -> Self {
        HookId(String::from(id))
    }
}

impl fmt::Display for HookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for HookId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HookId::new(s)
    }
}

impl TryFrom<String> for HookId {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        HookId::new(value)
    }
}

impl From<HookId> for String {
    fn from(id: HookId) -> Self {
        id.0
    }
}

/// Canonical set of inspected elements.
///
/// Membership is what identifies a hook, not the order the caller listed the
/// elements in, so the set is kept sorted and free of duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "Vec<ElementId>", into = "Vec<ElementId>")]
pub struct InspectedSet(Vec<ElementId>);

impl InspectedSet {
    pub fn new(elements: impl IntoIterator<Item = ElementId>) -> Self {
        let mut elements: Vec<ElementId> = elements.into_iter().collect();
        elements.sort();
        elements.dedup();
        InspectedSet(elements)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, element: &ElementId) -> bool {
        self.0.binary_search(element).is_ok()
    }

    /// Returns true if the two sets share at least one element.
    pub fn overlaps(&self, other: &InspectedSet) -> bool {
        self.0.iter().any(|e| other.contains(e))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ElementId> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[ElementId] {
        &self.0
    }
}

impl From<Vec<ElementId>> for InspectedSet {
    fn from(elements: Vec<ElementId>) -> Self {
        InspectedSet::new(elements)
    }
}

impl From<InspectedSet> for Vec<ElementId> {
    fn from(set: InspectedSet) -> Self {
        set.0
    }
}

impl FromIterator<ElementId> for InspectedSet {
    fn from_iter<I: IntoIterator<Item = ElementId>>(iter: I) -> Self {
        InspectedSet::new(iter)
    }
}

impl fmt::Display for InspectedSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", e)?;
        }
        write!(f, "]")
    }
}

/// Mutable attributes of an inspection hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HookParams {
    pub tag: u64,
    pub encapsulation: TagEncapsulationType,
    pub order: u64,
    #[serde(default)]
    pub failure_policy: FailurePolicyType,
}

impl HookParams {
    pub fn new(
        tag: u64,
        encapsulation: TagEncapsulationType,
        order: u64,
        failure_policy: FailurePolicyType,
    ) -> Self {
        Self {
            tag,
            encapsulation,
            order,
            failure_policy,
        }
    }
}

/// An installed inspection hook.
///
/// `hook_id`, `inspected` and `inspection_port` form the immutable identity;
/// the remaining fields can be changed in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionHookElement {
    pub hook_id: HookId,
    pub inspected: InspectedSet,
    pub inspection_port: InspectionPortElement,
    pub tag: u64,
    pub encapsulation: TagEncapsulationType,
    pub order: u64,
    pub failure_policy: FailurePolicyType,
}

impl InspectionHookElement {
    pub fn new(
        hook_id: HookId,
        inspected: InspectedSet,
        inspection_port: InspectionPortElement,
        params: HookParams,
    ) -> Self {
        Self {
            hook_id,
            inspected,
            inspection_port,
            tag: params.tag,
            encapsulation: params.encapsulation,
            order: params.order,
            failure_policy: params.failure_policy,
        }
    }

    pub fn params(&self) -> HookParams {
        HookParams::new(self.tag, self.encapsulation, self.order, self.failure_policy)
    }

    /// Replaces the mutable attributes, leaving identity untouched.
    pub fn apply(&mut self, params: HookParams) {
        self.tag = params.tag;
        self.encapsulation = params.encapsulation;
        self.order = params.order;
        self.failure_policy = params.failure_policy;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn id(s: &str) -> ElementId {
        s.parse().unwrap()
    }

    #[test]
    fn test_inspected_set_is_canonical() {
        let a = InspectedSet::new(vec![id("b"), id("a"), id("b")]);
        let b = InspectedSet::new(vec![id("a"), id("b")]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.to_string(), "[a,b]");
    }

    #[test]
    fn test_inspected_set_overlap() {
        let a = InspectedSet::new(vec![id("e1"), id("e2")]);
        let b = InspectedSet::new(vec![id("e2"), id("e3")]);
        let c = InspectedSet::new(vec![id("e4")]);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(!InspectedSet::default().overlaps(&a));
    }

    #[test]
    fn test_hook_id_from_element_id() {
        let hook: HookId = id("port1").into();
        assert_eq!(hook.as_str(), "port1");
        assert!(HookId::new("").is_err());
    }

    #[test]
    fn test_apply_keeps_identity() {
        let port = InspectionPortElement::symmetric(id("p3")).with_element_id(id("port1"));
        let params = HookParams::new(42, TagEncapsulationType::Vxlan, 1, FailurePolicyType::FailOpen);
        let mut hook = InspectionHookElement::new(
            "hook1".parse().unwrap(),
            InspectedSet::new(vec![id("c1")]),
            port.clone(),
            params,
        );

        hook.apply(HookParams::new(7, TagEncapsulationType::Vlan, 3, FailurePolicyType::FailClosed));

        assert_eq!(hook.hook_id.as_str(), "hook1");
        assert_eq!(hook.inspection_port, port);
        assert_eq!(hook.tag, 7);
        assert_eq!(hook.params().order, 3);
    }
}

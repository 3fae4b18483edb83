//! Network element identifiers and composition.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a network element on the SDN controller.
///
/// Identifiers are opaque controller strings (Neutron port UUIDs, port pair
/// group names, port chain ids). They must be non-empty and must not contain
/// whitespace.
///
/// # Examples
///
/// ```
/// use redirect_types::ElementId;
///
/// let id = ElementId::new("port-1").unwrap();
/// assert_eq!(id.as_str(), "port-1");
///
/// assert!(ElementId::new("").is_err());
/// assert!(ElementId::new("bad id").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ElementId(String);

impl ElementId {
    /// Creates a new element identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier is empty or contains whitespace.
    pub fn new(id: impl Into<String>) -> Result<Self, ParseError> {
        let id = id.into();
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(ParseError::InvalidElementId(id));
        }
        Ok(ElementId(id))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ElementId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ElementId::new(s)
    }
}

impl TryFrom<String> for ElementId {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ElementId::new(value)
    }
}

impl From<ElementId> for String {
    fn from(id: ElementId) -> Self {
        id.0
    }
}

impl AsRef<str> for ElementId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A network element: a single endpoint or an ordered composite.
///
/// For composites the child order is significant; it encodes the path
/// traffic takes (e.g. the port pair groups of a port chain).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkElement {
    pub id: ElementId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ElementId>,
}

impl NetworkElement {
    /// Creates a leaf element with no children.
    pub fn leaf(id: ElementId) -> Self {
        Self {
            id,
            children: Vec::new(),
        }
    }

    /// Creates a composite element with the given ordered children.
    pub fn composite(id: ElementId, children: Vec<ElementId>) -> Self {
        Self { id, children }
    }

    /// Returns true if this element has children.
    pub fn is_composite(&self) -> bool {
        !self.children.is_empty()
    }

    /// Returns true if `child` is a direct child of this element.
    pub fn has_child(&self, child: &ElementId) -> bool {
        self.children.contains(child)
    }
}

impl From<ElementId> for NetworkElement {
    fn from(id: ElementId) -> Self {
        NetworkElement::leaf(id)
    }
}

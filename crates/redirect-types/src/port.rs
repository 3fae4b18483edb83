//! Inspection port definitions.

use crate::ElementId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of an inspection port: the directed (ingress, egress) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InspectionPortKey {
    pub ingress: ElementId,
    pub egress: ElementId,
}

impl InspectionPortKey {
    pub fn new(ingress: ElementId, egress: ElementId) -> Self {
        Self { ingress, egress }
    }

    /// Returns true if traffic enters and exits through the same element.
    pub fn is_symmetric(&self) -> bool {
        self.ingress == self.egress
    }
}

impl fmt::Display for InspectionPortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.ingress, self.egress)
    }
}

/// Path through an inspection device.
///
/// If the ingress and egress ports are the same element, both accessors
/// return that element. `element_id` is the controller identifier assigned
/// at registration (the port pair id for SFC); callers building a port to
/// register or look up leave it empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InspectionPortElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<ElementId>,
    pub ingress_port: ElementId,
    pub egress_port: ElementId,
}

impl InspectionPortElement {
    /// Creates an unregistered inspection port.
    pub fn new(ingress_port: ElementId, egress_port: ElementId) -> Self {
        Self {
            element_id: None,
            ingress_port,
            egress_port,
        }
    }

    /// Creates a port whose traffic enters and exits through `port`.
    pub fn symmetric(port: ElementId) -> Self {
        Self::new(port.clone(), port)
    }

    /// Returns a copy carrying the controller-assigned identifier.
    pub fn with_element_id(mut self, element_id: ElementId) -> Self {
        self.element_id = Some(element_id);
        self
    }

    /// Returns the pair identity of this port.
    pub fn key(&self) -> InspectionPortKey {
        InspectionPortKey::new(self.ingress_port.clone(), self.egress_port.clone())
    }

    /// Returns true if `element` is the ingress or the egress of this port.
    pub fn references(&self, element: &ElementId) -> bool {
        &self.ingress_port == element || &self.egress_port == element
    }
}

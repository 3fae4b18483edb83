//! Common types for SDN traffic redirection.
//!
//! This crate provides the identifiers and records shared by the
//! redirection drivers and the redirection controller:
//!
//! - [`ElementId`] / [`NetworkElement`]: addressable endpoints and composites
//! - [`InspectionPortElement`]: (ingress, egress) path through an inspection device
//! - [`InspectionHookElement`]: binding of inspected elements to an inspection port
//! - [`TagEncapsulationType`] / [`FailurePolicyType`]: semantic hook attributes

mod element;
mod hook;
mod policy;
mod port;

pub use element::{ElementId, NetworkElement};
pub use hook::{HookId, HookParams, InspectedSet, InspectionHookElement};
pub use policy::{FailurePolicyType, TagEncapsulationType};
pub use port::{InspectionPortElement, InspectionPortKey};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid element identifier: {0:?}")]
    InvalidElementId(String),

    #[error("invalid hook identifier: {0:?}")]
    InvalidHookId(String),

    #[error("invalid tag encapsulation type: {0}")]
    InvalidEncapsulation(String),

    #[error("invalid failure policy type: {0}")]
    InvalidFailurePolicy(String),
}

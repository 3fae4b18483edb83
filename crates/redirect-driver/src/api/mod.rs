//! The driver trait and the bundled controller backends.
//!
//! Each backend wraps one SDN controller API:
//!
//! - [`sfc`]: Neutron service function chaining (port pairs, port pair
//!   groups, port chains)
//! - [`flow_classifier`]: Flow classifier rules steering into a port pair

pub mod flow_classifier;
pub mod sfc;

pub use flow_classifier::FlowClassifierDriver;
pub use sfc::SfcDriver;

use crate::error::DriverResult;
use crate::types::{DriverCapabilities, DriverSnapshot, HookRequest};
use redirect_types::{
    ElementId, HookId, HookParams, InspectionPortElement, InspectionPortKey, NetworkElement,
};

/// Operations a controller backend must provide.
///
/// Implementations are shared between threads. Creation calls must be
/// idempotent on their natural key where the controller offers one
/// (`create_inspection_port` on the port pair). Removal of something the
/// controller no longer holds reports `NotFound`.
pub trait RedirectionDriver: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &str;

    fn capabilities(&self) -> DriverCapabilities;

    /// Opens the controller session.
    fn connect(&self) -> DriverResult<()>;

    /// Closes the controller session.
    fn disconnect(&self) -> DriverResult<()>;

    fn lookup_element(&self, id: &ElementId) -> DriverResult<Option<NetworkElement>>;

    /// Creates a composite element over `children` and returns it with its
    /// controller-assigned id.
    fn create_element(&self, children: &[ElementId]) -> DriverResult<NetworkElement>;

    /// Replaces the child sequence of an existing composite.
    fn update_element(&self, id: &ElementId, children: &[ElementId]) -> DriverResult<NetworkElement>;

    fn delete_element(&self, id: &ElementId) -> DriverResult<()>;

    /// Creates (or returns the existing) inspection port for a pair.
    fn create_inspection_port(&self, key: &InspectionPortKey) -> DriverResult<ElementId>;

    /// Returns the inspection port the controller holds for a pair.
    fn lookup_inspection_port(&self, key: &InspectionPortKey) -> DriverResult<Option<InspectionPortElement>>;

    fn delete_inspection_port(&self, id: &ElementId) -> DriverResult<()>;

    /// Programs a hook and returns the identifier the controller uses for it.
    fn install_hook(&self, request: &HookRequest) -> DriverResult<HookId>;

    /// Rewrites the mutable attributes of a programmed hook.
    fn update_hook(&self, id: &HookId, params: &HookParams) -> DriverResult<()>;

    fn remove_hook(&self, id: &HookId) -> DriverResult<()>;

    /// Returns everything the controller currently holds.
    fn snapshot(&self) -> DriverResult<DriverSnapshot>;
}

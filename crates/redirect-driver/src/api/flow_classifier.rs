//! Flow classifier backend.
//!
//! Composites are port groups and inspection ports are plain port pairs.
//! Every hook is an independent classifier rule with a controller-generated
//! UUID, so one port pair may serve several hooks.

use super::RedirectionDriver;
use crate::error::{DriverError, DriverResult};
use crate::store::{self, ControllerStore};
use crate::types::{DriverCapabilities, DriverSnapshot, HookRequest};
use redirect_types::{
    ElementId, FailurePolicyType, HookId, HookParams, InspectionPortElement, InspectionPortKey,
    NetworkElement, TagEncapsulationType,
};
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Driver for a flow-classifier based controller.
#[derive(Debug)]
pub struct FlowClassifierDriver {
    store: Mutex<ControllerStore>,
}

impl FlowClassifierDriver {
    pub fn new(controller: impl Into<String>) -> Self {
        Self {
            store: Mutex::new(ControllerStore::new(controller)),
        }
    }

    pub fn add_port(&self, id: ElementId) {
        if let Ok(mut store) = self.store.lock() {
            store.add_leaf(id);
        }
    }

    fn rule_id() -> DriverResult<HookId> {
        HookId::new(format!("fc-{}", Uuid::new_v4()))
            .map_err(|e| DriverError::internal(e.to_string()))
    }
}

impl RedirectionDriver for FlowClassifierDriver {
    fn name(&self) -> &str {
        "flow_classifier"
    }

    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities {
            encapsulations: vec![TagEncapsulationType::Vlan, TagEncapsulationType::Vxlan],
            failure_policies: vec![FailurePolicyType::FailOpen, FailurePolicyType::FailClosed],
            hook_id_is_port_id: false,
        }
    }

    fn connect(&self) -> DriverResult<()> {
        store::lock(&self.store)?.connect()
    }

    fn disconnect(&self) -> DriverResult<()> {
        store::lock(&self.store)?.disconnect()
    }

    fn lookup_element(&self, id: &ElementId) -> DriverResult<Option<NetworkElement>> {
        let store = store::lock(&self.store)?;
        store.ensure_connected()?;
        Ok(store.element(id))
    }

    fn create_element(&self, children: &[ElementId]) -> DriverResult<NetworkElement> {
        let mut store = store::lock(&self.store)?;
        store.ensure_connected()?;
        store.create_composite("group", children)
    }

    fn update_element(&self, id: &ElementId, children: &[ElementId]) -> DriverResult<NetworkElement> {
        let mut store = store::lock(&self.store)?;
        store.ensure_connected()?;
        store.update_composite(id, children)
    }

    fn delete_element(&self, id: &ElementId) -> DriverResult<()> {
        let mut store = store::lock(&self.store)?;
        store.ensure_connected()?;
        store.delete_element(id)
    }

    fn create_inspection_port(&self, key: &InspectionPortKey) -> DriverResult<ElementId> {
        let mut store = store::lock(&self.store)?;
        store.ensure_connected()?;
        store.create_port("ip", key)
    }

    fn lookup_inspection_port(&self, key: &InspectionPortKey) -> DriverResult<Option<InspectionPortElement>> {
        let store = store::lock(&self.store)?;
        store.ensure_connected()?;
        Ok(store.port_for(key))
    }

    fn delete_inspection_port(&self, id: &ElementId) -> DriverResult<()> {
        let mut store = store::lock(&self.store)?;
        store.ensure_connected()?;
        store.delete_port(id)
    }

    fn install_hook(&self, request: &HookRequest) -> DriverResult<HookId> {
        self.capabilities().check(&request.params)?;
        let mut store = store::lock(&self.store)?;
        store.ensure_connected()?;
        let hook_id = store.insert_hook(Self::rule_id()?, request)?;
        debug!(hook = %hook_id, inspected = %request.inspected, "Created flow classifier");
        Ok(hook_id)
    }

    fn update_hook(&self, id: &HookId, params: &HookParams) -> DriverResult<()> {
        self.capabilities().check(params)?;
        let mut store = store::lock(&self.store)?;
        store.ensure_connected()?;
        store.update_hook(id, params)
    }

    fn remove_hook(&self, id: &HookId) -> DriverResult<()> {
        let mut store = store::lock(&self.store)?;
        store.ensure_connected()?;
        store.remove_hook(id)
    }

    fn snapshot(&self) -> DriverResult<DriverSnapshot> {
        let store = store::lock(&self.store)?;
        store.ensure_connected()?;
        Ok(store.snapshot())
    }
}

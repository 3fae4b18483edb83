//! Service function chaining backend.
//!
//! Composites map to port pair groups, inspection ports to port pairs. A
//! port chain is addressed by the port pair it steers into, so each
//! inspection port carries at most one hook and the hook id is the port
//! pair id.

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

const GROUP_PREFIX: &str = "chain";
const PORT_PAIR_PREFIX: &str = "pp";

/// Driver for a Neutron networking-sfc controller.
#[derive(Debug)]
pub struct SfcDriver {
    store: Mutex<ControllerStore>,
}

impl SfcDriver {
    pub fn new(controller: impl Into<String>) -> Self {
        Self {
            store: Mutex::new(ControllerStore::new(controller)),
        }
    }

    /// Makes a port provisioned outside the redirection layer visible to the
    /// driver.
    pub fn add_port(&self, id: ElementId) {
        if let Ok(mut store) = self.store.lock() {
            store.add_leaf(id);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.store.lock().map(|s| s.is_connected()).unwrap_or(false)
    }
}

impl RedirectionDriver for SfcDriver {
    fn name(&self) -> &str {
        "sfc"
    }

    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities {
            encapsulations: vec![
                TagEncapsulationType::Mpls,
                TagEncapsulationType::Nsh,
                TagEncapsulationType::Vxlan,
            ],
            failure_policies: vec![FailurePolicyType::FailOpen, FailurePolicyType::FailClosed],
            hook_id_is_port_id: true,
        }
    }

    fn connect(&self) -> DriverResult<()> {
        let mut store = store::lock(&self.store)?;
        store.connect()?;
        debug!(controller = store.controller(), "SFC session opened");
        Ok(())
    }

    fn disconnect(&self) -> DriverResult<()> {
        let mut store = store::lock(&self.store)?;
        store.disconnect()?;
        debug!(controller = store.controller(), "SFC session closed");
        Ok(())
    }

    fn lookup_element(&self, id: &ElementId) -> DriverResult<Option<NetworkElement>> {
        let store = store::lock(&self.store)?;
        store.ensure_connected()?;
        Ok(store.element(id))
    }

    fn create_element(&self, children: &[ElementId]) -> DriverResult<NetworkElement> {
        let mut store = store::lock(&self.store)?;
        store.ensure_connected()?;
        let element = store.create_composite(GROUP_PREFIX, children)?;
        debug!(id = %element.id, children = children.len(), "Created port pair group");
        Ok(element)
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
        let id = store.create_port(PORT_PAIR_PREFIX, key)?;
        debug!(id = %id, pair = %key, "Port pair ready");
        Ok(id)
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
        let port_id = request
            .inspection_port
            .element_id
            .clone()
            .ok_or_else(|| DriverError::invalid_parameter("port pair has no id"))?;

        let mut store = store::lock(&self.store)?;
        store.ensure_connected()?;
        let hook_id = HookId::from(port_id);
        if store.has_hook(&hook_id) {
            return Err(DriverError::already_exists(format!(
                "port chain on port pair {}",
                hook_id
            )));
        }
        let hook_id = store.insert_hook(hook_id, request)?;
        debug!(hook = %hook_id, inspected = %request.inspected, "Created port chain");
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

#[cfg(test)]
mod tests {
    use super::*;
    use redirect_types::InspectedSet;

    fn id(s: &str) -> ElementId {
        s.parse().unwrap()
    }

    fn connected() -> SfcDriver {
        let driver = SfcDriver::new("sfc-test");
        for p in ["p1", "p2", "p3"] {
            driver.add_port(id(p));
        }
        driver.connect().unwrap();
        driver
    }

    fn request(driver: &SfcDriver, inspected: &[&str], port: &str) -> HookRequest {
        let key = InspectionPortKey::new(id(port), id(port));
        let pp = driver.create_inspection_port(&key).unwrap();
        HookRequest {
            inspected: inspected.iter().map(|s| id(s)).collect(),
            inspection_port: InspectionPortElement::symmetric(id(port)).with_element_id(pp),
            params: HookParams::new(10, TagEncapsulationType::Mpls, 1, FailurePolicyType::FailOpen),
        }
    }

    #[test]
    fn test_requires_session() {
        let driver = SfcDriver::new("sfc-test");
        assert_eq!(driver.lookup_element(&id("p1")), Err(DriverError::Uninitialized));
        driver.connect().unwrap();
        assert!(driver.is_connected());
        driver.disconnect().unwrap();
        assert!(!driver.is_connected());
    }

    #[test]
    fn test_hook_id_is_port_pair_id() {
        let driver = connected();
        let req = request(&driver, &["p1"], "p3");
        let hook = driver.install_hook(&req).unwrap();
        assert_eq!(
            hook.as_str(),
            req.inspection_port.element_id.as_ref().unwrap().as_str()
        );
    }

    #[test]
    fn test_one_chain_per_port_pair() {
        let driver = connected();
        let req = request(&driver, &["p1"], "p3");
        driver.install_hook(&req).unwrap();

        let mut other = req.clone();
        other.inspected = InspectedSet::new(vec![id("p2")]);
        assert!(matches!(
            driver.install_hook(&other),
            Err(DriverError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn test_vlan_not_supported() {
        let driver = connected();
        let mut req = request(&driver, &["p1"], "p3");
        req.params.encapsulation = TagEncapsulationType::Vlan;
        assert!(matches!(
            driver.install_hook(&req),
            Err(DriverError::NotSupported { .. })
        ));
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let driver = connected();
        let chain = driver.create_element(&[id("p1"), id("p2")]).unwrap();
        assert!(chain.id.as_str().starts_with("chain-"));
        let req = request(&driver, &[chain.id.as_str()], "p3");
        driver.install_hook(&req).unwrap();

        let snapshot = driver.snapshot().unwrap();
        assert_eq!(snapshot.elements.len(), 4);
        assert_eq!(snapshot.ports.len(), 1);
        assert_eq!(snapshot.hooks.len(), 1);
    }
}

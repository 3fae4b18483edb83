//! In-process controller object store.
//!
//! The bundled backends keep the controller's objects in memory: leaf ports
//! provisioned outside the redirection layer, composites, inspection ports
//! and programmed hooks. Each backend wraps one store and decides how
//! identifiers are minted.

use crate::error::{DriverError, DriverResult};
use crate::types::{DriverSnapshot, HookRequest};
use redirect_types::{
    ElementId, HookId, HookParams, InspectionHookElement, InspectionPortElement,
    InspectionPortKey, NetworkElement,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug)]
pub(crate) struct ControllerStore {
    controller: String,
    connected: bool,
    leaves: BTreeSet<ElementId>,
    composites: BTreeMap<ElementId, Vec<ElementId>>,
    ports: BTreeMap<ElementId, InspectionPortKey>,
    hooks: BTreeMap<HookId, InspectionHookElement>,
    next_id: u64,
}

pub(crate) fn lock(store: &Mutex<ControllerStore>) -> DriverResult<MutexGuard<'_, ControllerStore>> {
    store
        .lock()
        .map_err(|_| DriverError::internal("controller store lock poisoned"))
}

impl ControllerStore {
    pub(crate) fn new(controller: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
            connected: false,
            leaves: BTreeSet::new(),
            composites: BTreeMap::new(),
            ports: BTreeMap::new(),
            hooks: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub(crate) fn controller(&self) -> &str {
        &self.controller
    }

    pub(crate) fn connect(&mut self) -> DriverResult<()> {
        if self.connected {
            return Err(DriverError::already_exists(format!(
                "session to {}",
                self.controller
            )));
        }
        self.connected = true;
        Ok(())
    }

    pub(crate) fn disconnect(&mut self) -> DriverResult<()> {
        if !self.connected {
            return Err(DriverError::Uninitialized);
        }
        self.connected = false;
        Ok(())
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected
    }

    pub(crate) fn ensure_connected(&self) -> DriverResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(DriverError::Uninitialized)
        }
    }

    pub(crate) fn add_leaf(&mut self, id: ElementId) {
        self.leaves.insert(id);
    }

    pub(crate) fn mint(&mut self, prefix: &str) -> DriverResult<ElementId> {
        let id = format!("{}-{}", prefix, self.next_id);
        self.next_id += 1;
        ElementId::new(id).map_err(|e| DriverError::internal(e.to_string()))
    }

    pub(crate) fn element(&self, id: &ElementId) -> Option<NetworkElement> {
        if let Some(children) = self.composites.get(id) {
            return Some(NetworkElement::composite(id.clone(), children.clone()));
        }
        if self.leaves.contains(id) {
            return Some(NetworkElement::leaf(id.clone()));
        }
        None
    }

    fn contains_element(&self, id: &ElementId) -> bool {
        self.leaves.contains(id) || self.composites.contains_key(id)
    }

    /// Returns true if `target` is reachable from `from` through composites.
    fn reaches(&self, from: &ElementId, target: &ElementId) -> bool {
        let mut stack = vec![from];
        let mut seen = BTreeSet::new();
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(children) = self.composites.get(current) {
                stack.extend(children.iter());
            }
        }
        false
    }

    fn validate_children(&self, parent: Option<&ElementId>, children: &[ElementId]) -> DriverResult<()> {
        if children.is_empty() {
            return Err(DriverError::invalid_parameter("composite requires at least one child"));
        }
        let mut seen = BTreeSet::new();
        for child in children {
            if !seen.insert(child) {
                return Err(DriverError::invalid_parameter(format!("duplicate child {}", child)));
            }
            if !self.contains_element(child) {
                return Err(DriverError::not_found(format!("element {}", child)));
            }
            if let Some(parent) = parent {
                if self.reaches(child, parent) {
                    return Err(DriverError::invalid_parameter(format!(
                        "child {} creates a cycle through {}",
                        child, parent
                    )));
                }
            }
        }
        Ok(())
    }

    pub(crate) fn create_composite(&mut self, prefix: &str, children: &[ElementId]) -> DriverResult<NetworkElement> {
        self.validate_children(None, children)?;
        let id = self.mint(prefix)?;
        self.composites.insert(id.clone(), children.to_vec());
        Ok(NetworkElement::composite(id, children.to_vec()))
    }

    pub(crate) fn update_composite(&mut self, id: &ElementId, children: &[ElementId]) -> DriverResult<NetworkElement> {
        if !self.composites.contains_key(id) {
            if self.leaves.contains(id) {
                return Err(DriverError::invalid_parameter(format!("{} is not a composite", id)));
            }
            return Err(DriverError::not_found(format!("element {}", id)));
        }
        self.validate_children(Some(id), children)?;
        self.composites.insert(id.clone(), children.to_vec());
        Ok(NetworkElement::composite(id.clone(), children.to_vec()))
    }

    fn element_users(&self, id: &ElementId) -> Option<String> {
        if let Some((parent, _)) = self.composites.iter().find(|(_, c)| c.contains(id)) {
            return Some(format!("composite {}", parent));
        }
        if let Some((port, _)) = self
            .ports
            .iter()
            .find(|(_, k)| &k.ingress == id || &k.egress == id)
        {
            return Some(format!("inspection port {}", port));
        }
        if let Some(hook) = self.hooks.values().find(|h| h.inspected.contains(id)) {
            return Some(format!("hook {}", hook.hook_id));
        }
        None
    }

    pub(crate) fn delete_element(&mut self, id: &ElementId) -> DriverResult<()> {
        if !self.contains_element(id) {
            return Err(DriverError::not_found(format!("element {}", id)));
        }
        if let Some(user) = self.element_users(id) {
            return Err(DriverError::object_in_use(format!("{} is referenced by {}", id, user)));
        }
        self.composites.remove(id);
        self.leaves.remove(id);
        Ok(())
    }

    pub(crate) fn create_port(&mut self, prefix: &str, key: &InspectionPortKey) -> DriverResult<ElementId> {
        for end in [&key.ingress, &key.egress] {
            if !self.contains_element(end) {
                return Err(DriverError::not_found(format!("element {}", end)));
            }
        }
        if let Some((id, _)) = self.ports.iter().find(|(_, k)| *k == key) {
            return Ok(id.clone());
        }
        let id = self.mint(prefix)?;
        self.ports.insert(id.clone(), key.clone());
        Ok(id)
    }

    pub(crate) fn port(&self, id: &ElementId) -> Option<InspectionPortElement> {
        self.ports.get(id).map(|key| {
            InspectionPortElement::new(key.ingress.clone(), key.egress.clone())
                .with_element_id(id.clone())
        })
    }

    pub(crate) fn port_for(&self, key: &InspectionPortKey) -> Option<InspectionPortElement> {
        self.ports
            .iter()
            .find(|(_, k)| *k == key)
            .and_then(|(id, _)| self.port(id))
    }

    pub(crate) fn delete_port(&mut self, id: &ElementId) -> DriverResult<()> {
        if !self.ports.contains_key(id) {
            return Err(DriverError::not_found(format!("inspection port {}", id)));
        }
        if let Some(hook) = self
            .hooks
            .values()
            .find(|h| h.inspection_port.element_id.as_ref() == Some(id))
        {
            return Err(DriverError::object_in_use(format!(
                "inspection port {} is used by hook {}",
                id, hook.hook_id
            )));
        }
        self.ports.remove(id);
        Ok(())
    }

    pub(crate) fn has_hook(&self, id: &HookId) -> bool {
        self.hooks.contains_key(id)
    }

    pub(crate) fn insert_hook(&mut self, hook_id: HookId, request: &HookRequest) -> DriverResult<HookId> {
        if self.hooks.contains_key(&hook_id) {
            return Err(DriverError::already_exists(format!("hook {}", hook_id)));
        }
        let port_id = request
            .inspection_port
            .element_id
            .as_ref()
            .ok_or_else(|| DriverError::invalid_parameter("inspection port has no element id"))?;
        let port = self
            .port(port_id)
            .ok_or_else(|| DriverError::not_found(format!("inspection port {}", port_id)))?;
        if let Some(missing) = request.inspected.iter().find(|e| !self.contains_element(e)) {
            return Err(DriverError::not_found(format!("element {}", missing)));
        }
        let hook = InspectionHookElement::new(
            hook_id.clone(),
            request.inspected.clone(),
            port,
            request.params,
        );
        self.hooks.insert(hook_id.clone(), hook);
        Ok(hook_id)
    }

    pub(crate) fn update_hook(&mut self, id: &HookId, params: &HookParams) -> DriverResult<()> {
        let hook = self
            .hooks
            .get_mut(id)
            .ok_or_else(|| DriverError::not_found(format!("hook {}", id)))?;
        hook.apply(*params);
        Ok(())
    }

    pub(crate) fn remove_hook(&mut self, id: &HookId) -> DriverResult<()> {
        self.hooks
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| DriverError::not_found(format!("hook {}", id)))
    }

    pub(crate) fn snapshot(&self) -> DriverSnapshot {
        let elements = self
            .leaves
            .iter()
            .filter(|id| !self.composites.contains_key(*id))
            .map(|id| NetworkElement::leaf(id.clone()))
            .chain(
                self.composites
                    .iter()
                    .map(|(id, c)| NetworkElement::composite(id.clone(), c.clone())),
            )
            .collect();
        let ports = self.ports.keys().filter_map(|id| self.port(id)).collect();
        let hooks = self.hooks.values().cloned().collect();
        DriverSnapshot {
            elements,
            ports,
            hooks,
        }
    }
}

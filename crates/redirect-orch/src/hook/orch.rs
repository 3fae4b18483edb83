//! Inspection hook orchestration logic.

use super::types::{HookKey, HookManagerStats};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::element::ElementRegistry;
use crate::error::{RedirectionError, Result};
use crate::port::PortManager;
use crate::{audit_log, debug_log, error_log, info_log, warn_log};
use parking_lot::RwLock;
use redirect_driver::{DriverError, HookRequest, RedirectionDriver};
use redirect_orch_common::{IndexedMap, KeyedLock, ReverseIndex, SyncDelta};
use redirect_types::{
    ElementId, FailurePolicyType, HookId, HookParams, InspectedSet, InspectionHookElement,
    InspectionPortElement, InspectionPortKey,
};
use std::collections::BTreeSet;
use std::sync::Arc;

const SOURCE: &str = "HookManager";

#[derive(Default)]
struct HookState {
    hooks: IndexedMap<HookId, HookKey, InspectionHookElement>,
    /// Inspected element -> hooks inspecting it
    by_element: ReverseIndex<ElementId, HookId>,
    /// Inspection port id -> hooks steering into it
    by_port: ReverseIndex<ElementId, HookId>,
    stats: HookManagerStats,
}

impl HookState {
    fn insert(&mut self, hook: InspectionHookElement) -> Result<()> {
        let port = hook
            .inspection_port
            .element_id
            .clone()
            .ok_or_else(|| RedirectionError::invalid(format!("hook {} has an unregistered port", hook.hook_id)))?;
        let key = HookKey::new(hook.inspected.clone(), port.clone());
        let id = hook.hook_id.clone();
        let elements: Vec<ElementId> = hook.inspected.iter().cloned().collect();

        self.hooks
            .insert(id.clone(), key.clone(), hook)
            .map_err(|e| RedirectionError::conflict(format!("hook {} ({}): {}", id, key, e)))?;
        for element in elements {
            self.by_element.add(element, id.clone());
        }
        self.by_port.add(port, id);
        Ok(())
    }

    fn remove(&mut self, id: &HookId) -> Option<InspectionHookElement> {
        let hook = self.hooks.remove(id)?;
        for element in hook.inspected.iter() {
            self.by_element.remove(element, id);
        }
        if let Some(port) = &hook.inspection_port.element_id {
            self.by_port.remove(port, id);
        }
        Some(hook)
    }

    /// Hooks, other than `exclude`, whose inspected set names one of
    /// `elements`.
    fn overlapping<'a, 'b>(
        &'a self,
        elements: impl IntoIterator<Item = &'b ElementId>,
        exclude: Option<&HookId>,
    ) -> Vec<&'a InspectionHookElement> {
        let ids: BTreeSet<&HookId> = elements
            .into_iter()
            .flat_map(|e| self.by_element.keys_for(e))
            .filter(|id| Some(*id) != exclude)
            .collect();
        ids.into_iter().filter_map(|id| self.hooks.get(id)).collect()
    }

    /// Refuses a hook whose order equals that of a hook sharing traffic with
    /// it. `reach` is the hook's reach as computed by
    /// [`HookManager::reach`].
    fn check_order(&self, reach: &BTreeSet<ElementId>, order: u64, exclude: Option<&HookId>) -> Result<()> {
        if let Some(other) = self.overlapping(reach, exclude).into_iter().find(|h| h.order == order) {
            return Err(RedirectionError::conflict(format!(
                "order {} already used by hook {} on overlapping elements {}",
                order, other.hook_id, other.inspected
            )));
        }
        Ok(())
    }

    /// Refuses a new hook that would inspect an element through a port that
    /// already inspects it, which would make (element, port) ambiguous.
    fn check_port(&self, inspected: &InspectedSet, port: &ElementId) -> Result<()> {
        if let Some(other) = self
            .overlapping(inspected.iter(), None)
            .into_iter()
            .find(|h| h.inspection_port.element_id.as_ref() == Some(port))
        {
            return Err(RedirectionError::conflict(format!(
                "elements {} already inspected through port {} by hook {}",
                other.inspected, port, other.hook_id
            )));
        }
        Ok(())
    }

    fn find_by_pair(&self, inspected: &ElementId, port: &ElementId) -> Option<&InspectionHookElement> {
        self.by_element
            .keys_for(inspected)
            .filter_map(|id| self.hooks.get(id))
            .find(|h| h.inspection_port.element_id.as_ref() == Some(port))
    }

    /// Hooks naming any of `covering`, in evaluation order.
    fn chain(&self, covering: &BTreeSet<ElementId>) -> Vec<InspectionHookElement> {
        let mut chain: Vec<InspectionHookElement> = self
            .overlapping(covering, None)
            .into_iter()
            .cloned()
            .collect();
        chain.sort_by(|a, b| (a.order, &a.hook_id).cmp(&(b.order, &b.hook_id)));
        chain
    }

    /// Ids and inspected sets of the hooks inspecting `element`.
    fn footprint(&self, element: &ElementId) -> Vec<(HookId, InspectedSet)> {
        self.by_element
            .keys_for(element)
            .filter_map(|id| self.hooks.get(id))
            .map(|h| (h.hook_id.clone(), h.inspected.clone()))
            .collect()
    }
}

/// Cache and serialization point for inspection hooks.
pub struct HookManager {
    driver: Arc<dyn RedirectionDriver>,
    elements: Arc<ElementRegistry>,
    ports: Arc<PortManager>,
    state: RwLock<HookState>,
    locks: KeyedLock<ElementId>,
}

impl HookManager {
    pub fn new(
        driver: Arc<dyn RedirectionDriver>,
        elements: Arc<ElementRegistry>,
        ports: Arc<PortManager>,
    ) -> Self {
        Self {
            driver,
            elements,
            ports,
            state: RwLock::new(HookState::default()),
            locks: KeyedLock::new(),
        }
    }

    fn driver_failed(&self, action: &str, object: &str, err: DriverError) -> RedirectionError {
        self.state.write().stats.driver_errors += 1;
        error_log!(SOURCE, action, object, error = %err, "Driver call failed");
        audit_log!(AuditRecord::new(AuditCategory::DriverOperation, SOURCE, action)
            .with_object_id(object)
            .with_object_type("inspection_hook")
            .with_error(err.to_string()));
        RedirectionError::Backend(err)
    }

    /// Records a request refused before reaching the driver.
    fn refused(&self, action: &str, object: &str, err: RedirectionError) -> RedirectionError {
        if matches!(err, RedirectionError::Conflict(_)) {
            self.state.write().stats.conflicts += 1;
        }
        warn_log!(SOURCE, action, object, error = %err, "Request refused");
        let category = if action == "install_hook" {
            AuditCategory::ResourceCreate
        } else {
            AuditCategory::ResourceModify
        };
        audit_log!(AuditRecord::new(category, SOURCE, action)
            .with_outcome(AuditOutcome::Denied)
            .with_object_id(object)
            .with_object_type("inspection_hook")
            .with_error(err.to_string()));
        err
    }

    /// Elements whose traffic a hook on `inspected` shares with other
    /// hooks: everything `inspected` contains, transitively, and every
    /// cached composite containing one of those.
    fn reach(&self, inspected: &InspectedSet) -> Result<BTreeSet<ElementId>> {
        let members = self.elements.expand(inspected.iter())?;
        Ok(self.elements.containing(&members))
    }

    /// Resolves the port and every inspected element of a new hook.
    fn resolve_refs(&self, inspected: &InspectedSet, port: &InspectionPortElement) -> Result<InspectionPortElement> {
        let port = self.ports.resolve(port)?;
        for element in inspected.iter() {
            if !self.elements.exists(element)? {
                return Err(RedirectionError::port_not_found(format!(
                    "inspected element {}",
                    element
                )));
            }
        }
        Ok(port)
    }

    /// Installs a hook and returns the id the controller assigned.
    ///
    /// Installing the same (inspected set, port) again with identical
    /// attributes returns the existing id; with different attributes it is a
    /// `Conflict`.
    ///
    /// # Errors
    ///
    /// - `PortNotFound` if the port is not registered or an inspected element
    ///   does not exist
    /// - `Conflict` on an order collision with a hook sharing traffic (an
    ///   inspected element, a member of one or a composite containing one),
    ///   or if an inspected element is already inspected through this port
    /// - `Invalid` for an empty inspected set
    /// - `Backend` if the controller rejects the hook or its attributes
    pub fn install(
        &self,
        inspected: &[ElementId],
        port: &InspectionPortElement,
        params: HookParams,
    ) -> Result<HookId> {
        let set = InspectedSet::new(inspected.iter().cloned());
        let object = format!("{}@{}", set, port.key());
        debug_log!(SOURCE, inspected = %set, port = %port.key(), order = params.order, "Installing inspection hook");

        if set.is_empty() {
            return Err(self.refused("install_hook", &object, RedirectionError::invalid("empty inspected element set")));
        }
        let port = self
            .resolve_refs(&set, port)
            .map_err(|e| self.refused("install_hook", &object, e))?;
        let port_id = port
            .element_id
            .clone()
            .ok_or_else(|| RedirectionError::port_not_found(format!("inspection port {}", port.key())))?;
        self.driver
            .capabilities()
            .check(&params)
            .map_err(|e| self.driver_failed("install_hook", &object, e))?;

        let reach = self.reach(&set)?;
        let _guard = self.locks.lock_all(reach.iter().cloned());
        let key = HookKey::new(set.clone(), port_id);

        let (existing, checked) = {
            let state = self.state.read();
            let found = match state.hooks.get_by_secondary(&key) {
                Some(hook) => (Some(hook.clone()), Ok(())),
                None => (
                    None,
                    state
                        .check_port(&set, &key.port)
                        .and_then(|()| state.check_order(&reach, params.order, None)),
                ),
            };
            found
        };
        checked.map_err(|e| self.refused("install_hook", &object, e))?;
        if let Some(hook) = existing {
            if hook.params() == params {
                self.state.write().stats.hooks_reused += 1;
                debug_log!(SOURCE, hook = %hook.hook_id, "Identical hook already installed");
                return Ok(hook.hook_id);
            }
            return Err(self.refused(
                "install_hook",
                &object,
                RedirectionError::conflict(format!(
                    "hook {} already installed for {} with different attributes",
                    hook.hook_id, key
                )),
            ));
        }

        let request = HookRequest {
            inspected: set.clone(),
            inspection_port: port.clone(),
            params,
        };
        let hook_id = self
            .driver
            .install_hook(&request)
            .map_err(|e| self.driver_failed("install_hook", &object, e))?;

        let hook = InspectionHookElement::new(hook_id.clone(), set, port, params);
        {
            let mut state = self.state.write();
            state.insert(hook)?;
            state.stats.hooks_installed += 1;
        }

        info_log!(SOURCE, hook = %hook_id, key = %key, order = params.order, "Inspection hook installed");
        audit_log!(AuditRecord::new(AuditCategory::ResourceCreate, SOURCE, "install_hook")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(hook_id.as_str())
            .with_object_type("inspection_hook")
            .with_details(serde_json::json!({
                "inspected": key.inspected.to_string(),
                "inspection_port": key.port.as_str(),
                "tag": params.tag,
                "encapsulation": params.encapsulation.to_string(),
                "order": params.order,
                "failure_policy": params.failure_policy.to_string(),
            })));

        Ok(hook_id)
    }

    /// Removes the hook for (inspected set, port). Absent hooks are a no-op.
    pub fn remove(&self, inspected: &[ElementId], port: &InspectionPortElement) -> Result<()> {
        match self.find(inspected, port) {
            Some(hook) => self.remove_by_id(&hook.hook_id),
            None => {
                debug_log!(SOURCE, port = %port.key(), "No hook to remove");
                Ok(())
            }
        }
    }

    /// Removes a hook by id. Absent hooks are a no-op.
    pub fn remove_by_id(&self, id: &HookId) -> Result<()> {
        debug_log!(SOURCE, hook = %id, "Removing inspection hook");
        loop {
            let Some(hook) = self.get(id) else {
                return Ok(());
            };
            let _guard = self.locks.lock_all(hook.inspected.iter().cloned());
            match self.get(id) {
                None => return Ok(()),
                Some(current) if current.inspected == hook.inspected => {
                    return self.remove_locked(id);
                }
                // Reinstalled under the same id with other elements; lock those.
                Some(_) => continue,
            }
        }
    }

    /// Removes a hook whose element locks the caller holds.
    fn remove_locked(&self, id: &HookId) -> Result<()> {
        match self.driver.remove_hook(id) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                warn_log!(SOURCE, hook = %id, "Controller no longer holds hook");
            }
            Err(e) => return Err(self.driver_failed("remove_hook", id.as_str(), e)),
        }

        let removed = {
            let mut state = self.state.write();
            let removed = state.remove(id);
            if removed.is_some() {
                state.stats.hooks_removed += 1;
            }
            removed
        };

        if let Some(hook) = removed {
            info_log!(SOURCE, hook = %id, "Inspection hook removed");
            audit_log!(AuditRecord::new(AuditCategory::ResourceDelete, SOURCE, "remove_hook")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(id.as_str())
                .with_object_type("inspection_hook")
                .with_details(serde_json::json!({
                    "inspected": hook.inspected.to_string(),
                    "inspection_port": hook.inspection_port.key().to_string(),
                })));
        }
        Ok(())
    }

    /// Removes every hook whose inspected set includes `element` and
    /// returns how many were removed.
    ///
    /// Hooks not naming `element` are untouched, including hooks on a
    /// composite containing it. On a driver failure the
    /// hooks already removed stay removed; calling again finishes the job.
    pub fn remove_all_for(&self, element: &ElementId) -> Result<usize> {
        debug_log!(SOURCE, element = %element, "Removing all hooks for element");
        loop {
            let before = self.state.read().footprint(element);
            if before.is_empty() {
                return Ok(0);
            }

            let mut keys: BTreeSet<ElementId> = before
                .iter()
                .flat_map(|(_, set)| set.iter().cloned())
                .collect();
            keys.insert(element.clone());
            let _guard = self.locks.lock_all(keys);

            let now = self.state.read().footprint(element);
            if now.iter().any(|entry| !before.contains(entry)) {
                continue;
            }

            let mut removed = 0;
            for (id, _) in &now {
                self.remove_locked(id)?;
                removed += 1;
            }

            audit_log!(AuditRecord::new(AuditCategory::ResourceDelete, SOURCE, "remove_all_hooks")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(element.as_str())
                .with_object_type("network_element")
                .with_details(serde_json::json!({ "removed": removed })));
            return Ok(removed);
        }
    }

    pub fn get(&self, id: &HookId) -> Option<InspectionHookElement> {
        self.state.read().hooks.get(id).cloned()
    }

    /// Looks a hook up by its exact (inspected set, port) key.
    pub fn find(&self, inspected: &[ElementId], port: &InspectionPortElement) -> Option<InspectionHookElement> {
        let port_id = self.ports.resolve(port).ok()?.element_id?;
        let key = HookKey::new(InspectedSet::new(inspected.iter().cloned()), port_id);
        self.state.read().hooks.get_by_secondary(&key).cloned()
    }

    /// Looks up the hook inspecting `inspected` through `port`.
    ///
    /// Agrees with [`get`](Self::get) on the same record.
    pub fn get_by_pair(&self, inspected: &ElementId, port: &InspectionPortElement) -> Option<InspectionHookElement> {
        let port_id = self.ports.resolve(port).ok()?.element_id?;
        self.state.read().find_by_pair(inspected, &port_id).cloned()
    }

    /// Like [`get_by_pair`](Self::get_by_pair), but fails with
    /// `PortNotFound` when the port is not registered or the inspected
    /// element does not exist.
    fn resolve_pair(&self, inspected: &ElementId, port: &InspectionPortElement) -> Result<Option<InspectionHookElement>> {
        let port = self.ports.resolve(port)?;
        if !self.elements.exists(inspected)? {
            return Err(RedirectionError::port_not_found(format!("inspected element {}", inspected)));
        }
        let Some(port_id) = port.element_id else {
            return Ok(None);
        };
        Ok(self.state.read().find_by_pair(inspected, &port_id).cloned())
    }

    fn require_pair(&self, inspected: &ElementId, port: &InspectionPortElement) -> Result<InspectionHookElement> {
        self.resolve_pair(inspected, port)?.ok_or_else(|| {
            RedirectionError::not_found(format!("hook for {} through {}", inspected, port.key()))
        })
    }

    /// Applies `mutate` to a hook's attributes under its element locks.
    ///
    /// When `identity` is given, the hook must still have that inspected set
    /// and port pair.
    fn modify(
        &self,
        action: &str,
        id: &HookId,
        identity: Option<(&InspectedSet, &InspectionPortKey)>,
        mutate: impl Fn(&mut HookParams),
    ) -> Result<()> {
        loop {
            let hook = self
                .get(id)
                .ok_or_else(|| RedirectionError::not_found(format!("hook {}", id)))?;
            let reach = self.reach(&hook.inspected)?;
            let _guard = self.locks.lock_all(reach.iter().cloned());
            let current = self
                .get(id)
                .ok_or_else(|| RedirectionError::not_found(format!("hook {}", id)))?;
            if current.inspected != hook.inspected {
                continue;
            }
            if let Some((inspected, port)) = identity {
                if &current.inspected != inspected || &current.inspection_port.key() != port {
                    return Err(self.refused(
                        action,
                        id.as_str(),
                        RedirectionError::conflict(format!("identity of hook {} does not match", id)),
                    ));
                }
            }

            let old = current.params();
            let mut new = old;
            mutate(&mut new);
            if new == old {
                return Ok(());
            }
            if new.order != old.order {
                let checked = self.state.read().check_order(&reach, new.order, Some(id));
                checked.map_err(|e| self.refused(action, id.as_str(), e))?;
            }
            self.driver
                .capabilities()
                .check(&new)
                .map_err(|e| self.driver_failed(action, id.as_str(), e))?;

            match self.driver.update_hook(id, &new) {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    warn_log!(SOURCE, hook = %id, "Controller no longer holds hook, dropping it");
                    self.state.write().remove(id);
                    return Err(RedirectionError::not_found(format!("hook {}", id)));
                }
                Err(e) => return Err(self.driver_failed(action, id.as_str(), e)),
            }

            {
                let mut state = self.state.write();
                if let Some(hook) = state.hooks.get_mut(id) {
                    hook.apply(new);
                }
                state.stats.hooks_updated += 1;
            }

            audit_log!(AuditRecord::new(AuditCategory::ResourceModify, SOURCE, action)
                .with_outcome(AuditOutcome::Success)
                .with_object_id(id.as_str())
                .with_object_type("inspection_hook")
                .with_details(serde_json::json!({
                    "old": { "tag": old.tag, "order": old.order, "failure_policy": old.failure_policy.to_string() },
                    "new": { "tag": new.tag, "order": new.order, "failure_policy": new.failure_policy.to_string() },
                    "encapsulation": new.encapsulation.to_string(),
                })));
            return Ok(());
        }
    }

    pub fn set_tag(&self, inspected: &ElementId, port: &InspectionPortElement, tag: u64) -> Result<()> {
        let hook = self.require_pair(inspected, port)?;
        self.modify("set_tag", &hook.hook_id, None, |p| p.tag = tag)
    }

    pub fn get_tag(&self, inspected: &ElementId, port: &InspectionPortElement) -> Result<Option<u64>> {
        Ok(self.resolve_pair(inspected, port)?.map(|h| h.tag))
    }

    /// Moves a hook within its chain. Refused if another hook sharing
    /// traffic with it already uses `order`.
    pub fn set_order(&self, inspected: &ElementId, port: &InspectionPortElement, order: u64) -> Result<()> {
        let hook = self.require_pair(inspected, port)?;
        self.modify("set_order", &hook.hook_id, None, |p| p.order = order)
    }

    pub fn get_order(&self, inspected: &ElementId, port: &InspectionPortElement) -> Result<Option<u64>> {
        Ok(self.resolve_pair(inspected, port)?.map(|h| h.order))
    }

    pub fn set_failure_policy(
        &self,
        inspected: &ElementId,
        port: &InspectionPortElement,
        policy: FailurePolicyType,
    ) -> Result<()> {
        let hook = self.require_pair(inspected, port)?;
        self.modify("set_failure_policy", &hook.hook_id, None, |p| p.failure_policy = policy)
    }

    pub fn get_failure_policy(
        &self,
        inspected: &ElementId,
        port: &InspectionPortElement,
    ) -> Result<Option<FailurePolicyType>> {
        Ok(self.resolve_pair(inspected, port)?.map(|h| h.failure_policy))
    }

    /// Replaces all mutable attributes of an installed hook from `snapshot`.
    ///
    /// The snapshot's id, inspected set and port pair must match the
    /// installed hook.
    pub fn update(&self, snapshot: &InspectionHookElement) -> Result<()> {
        debug_log!(SOURCE, hook = %snapshot.hook_id, "Updating inspection hook from snapshot");
        let port = self.ports.resolve(&snapshot.inspection_port)?;
        let params = snapshot.params();
        self.modify(
            "update_hook",
            &snapshot.hook_id,
            Some((&snapshot.inspected, &port.key())),
            |p| *p = params,
        )
    }

    /// Hooks whose traffic includes `element`'s, sorted by (order, hook id):
    /// hooks on `element` itself and on every composite containing it.
    pub fn inspection_chain(&self, element: &ElementId) -> Vec<InspectionHookElement> {
        let covering = self.elements.containing([element]);
        self.state.read().chain(&covering)
    }

    /// Inspection ports traffic of `element` passes through, in evaluation
    /// order.
    pub fn inspection_ports_for(&self, element: &ElementId) -> Vec<InspectionPortElement> {
        self.inspection_chain(element)
            .into_iter()
            .map(|h| h.inspection_port)
            .collect()
    }

    /// Elements inspected through `port`, or `None` if the port is not
    /// registered.
    pub fn inspected_elements_for(&self, port: &InspectionPortElement) -> Option<Vec<ElementId>> {
        let port_id = self.ports.resolve(port).ok()?.element_id?;
        let state = self.state.read();
        let elements: BTreeSet<ElementId> = state
            .by_port
            .keys_for(&port_id)
            .filter_map(|id| state.hooks.get(id))
            .flat_map(|h| h.inspected.iter().cloned())
            .collect();
        Some(elements.into_iter().collect())
    }

    /// Returns true if any hook steers into the port with this id.
    pub fn is_port_in_use(&self, port_id: &ElementId) -> bool {
        self.state.read().by_port.is_referenced(port_id)
    }

    /// Returns true if any hook inspects `element`.
    pub fn is_inspected(&self, element: &ElementId) -> bool {
        self.state.read().by_element.is_referenced(element)
    }

    pub fn hooks(&self) -> Vec<InspectionHookElement> {
        self.state.read().hooks.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().hooks.is_empty()
    }

    pub fn stats(&self) -> HookManagerStats {
        self.state.read().stats.clone()
    }

    /// Replaces the cache with the controller's view.
    ///
    /// Hooks whose port has no id or whose key repeats are skipped.
    pub fn rebuild(&self, hooks: Vec<InspectionHookElement>) -> SyncDelta {
        let mut fresh = HookState::default();
        for hook in hooks {
            let id = hook.hook_id.clone();
            if let Err(e) = fresh.insert(hook) {
                warn_log!(SOURCE, hook = %id, error = %e, "Skipping hook from controller");
            }
        }

        let mut state = self.state.write();
        let mut delta = SyncDelta::default();
        for (id, hook) in fresh.hooks.iter() {
            match state.hooks.get(id) {
                None => delta.added += 1,
                Some(cached) if cached != hook => delta.updated += 1,
                Some(_) => {}
            }
        }
        delta.removed = state.hooks.keys().filter(|id| !fresh.hooks.contains_key(id)).count();

        fresh.stats = std::mem::take(&mut state.stats);
        *state = fresh;

        debug_log!(SOURCE, delta = %delta, "Hook cache rebuilt");
        delta
    }
}

//! Element registry logic.

use super::types::ElementRegistryStats;
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::error::{RedirectionError, Result};
use crate::{audit_log, debug_log, error_log, info_log};
use parking_lot::RwLock;
use redirect_driver::{DriverError, RedirectionDriver};
use redirect_orch_common::SyncDelta;
use redirect_types::{ElementId, NetworkElement};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

const SOURCE: &str = "ElementRegistry";

#[derive(Default)]
struct ElementState {
    elements: BTreeMap<ElementId, NetworkElement>,
    stats: ElementRegistryStats,
}

/// Cache of the controller's network elements.
pub struct ElementRegistry {
    driver: Arc<dyn RedirectionDriver>,
    state: RwLock<ElementState>,
}

impl ElementRegistry {
    pub fn new(driver: Arc<dyn RedirectionDriver>) -> Self {
        Self {
            driver,
            state: RwLock::new(ElementState::default()),
        }
    }

    fn driver_failed(&self, action: &str, object: &str, err: DriverError) -> RedirectionError {
        self.state.write().stats.driver_errors += 1;
        error_log!(SOURCE, action, object, error = %err, "Driver call failed");
        audit_log!(AuditRecord::new(AuditCategory::DriverOperation, SOURCE, action)
            .with_object_id(object)
            .with_object_type("network_element")
            .with_error(err.to_string()));
        RedirectionError::Backend(err)
    }

    /// Creates a composite whose children are `children`, in order.
    ///
    /// The controller rejects duplicate or unknown children; that surfaces
    /// as a backend failure.
    pub fn register(&self, children: &[ElementId]) -> Result<NetworkElement> {
        debug_log!(SOURCE, children = children.len(), "Registering composite element");

        let element = self
            .driver
            .create_element(children)
            .map_err(|e| self.driver_failed("register_element", "composite", e))?;

        {
            let mut state = self.state.write();
            state.elements.insert(element.id.clone(), element.clone());
            state.stats.composites_created += 1;
        }

        info_log!(SOURCE, id = %element.id, children = element.children.len(), "Composite element registered");
        audit_log!(AuditRecord::new(AuditCategory::ResourceCreate, SOURCE, "register_element")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(element.id.as_str())
            .with_object_type("network_element")
            .with_details(serde_json::json!({
                "children": element.children.iter().map(ElementId::as_str).collect::<Vec<_>>(),
            })));

        Ok(element)
    }

    /// Replaces the child sequence of an existing composite.
    pub fn update(&self, id: &ElementId, children: &[ElementId]) -> Result<NetworkElement> {
        debug_log!(SOURCE, id = %id, children = children.len(), "Updating element children");

        if self.resolve(id)?.is_none() {
            audit_log!(AuditRecord::new(AuditCategory::ResourceModify, SOURCE, "update_element")
                .with_object_id(id.as_str())
                .with_object_type("network_element")
                .with_error("element not found"));
            return Err(RedirectionError::not_found(format!("element {}", id)));
        }

        let element = match self.driver.update_element(id, children) {
            Ok(element) => element,
            Err(e) if e.is_not_found() && self.driver.lookup_element(id).ok().flatten().is_none() => {
                self.state.write().elements.remove(id);
                return Err(RedirectionError::not_found(format!("element {}", id)));
            }
            Err(e) => return Err(self.driver_failed("update_element", id.as_str(), e)),
        };

        {
            let mut state = self.state.write();
            state.elements.insert(element.id.clone(), element.clone());
            state.stats.composites_updated += 1;
        }

        audit_log!(AuditRecord::new(AuditCategory::ResourceModify, SOURCE, "update_element")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(id.as_str())
            .with_object_type("network_element")
            .with_details(serde_json::json!({
                "children": element.children.iter().map(ElementId::as_str).collect::<Vec<_>>(),
            })));

        Ok(element)
    }

    /// Deletes an element. Unknown elements are a no-op.
    pub fn delete(&self, id: &ElementId) -> Result<()> {
        debug_log!(SOURCE, id = %id, "Deleting element");

        if self.resolve(id)?.is_none() {
            debug_log!(SOURCE, id = %id, "Element already absent");
            return Ok(());
        }

        match self.driver.delete_element(id) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug_log!(SOURCE, id = %id, "Controller no longer holds element");
            }
            Err(e) => return Err(self.driver_failed("delete_element", id.as_str(), e)),
        }

        {
            let mut state = self.state.write();
            state.elements.remove(id);
            state.stats.elements_deleted += 1;
        }

        audit_log!(AuditRecord::new(AuditCategory::ResourceDelete, SOURCE, "delete_element")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(id.as_str())
            .with_object_type("network_element"));

        Ok(())
    }

    /// Returns the children of `id`, or `None` if the element is unknown.
    ///
    /// A leaf returns an empty sequence.
    pub fn list(&self, id: &ElementId) -> Result<Option<Vec<ElementId>>> {
        Ok(self.resolve(id)?.map(|e| e.children))
    }

    /// Looks an element up, asking the controller on a cache miss.
    pub fn resolve(&self, id: &ElementId) -> Result<Option<NetworkElement>> {
        if let Some(element) = self.state.read().elements.get(id) {
            return Ok(Some(element.clone()));
        }

        let found = self
            .driver
            .lookup_element(id)
            .map_err(|e| self.driver_failed("lookup_element", id.as_str(), e))?;

        if let Some(element) = &found {
            let mut state = self.state.write();
            state.elements.insert(element.id.clone(), element.clone());
            state.stats.elements_learned += 1;
            debug_log!(SOURCE, id = %id, composite = element.is_composite(), "Learned element from controller");
        }
        Ok(found)
    }

    pub fn exists(&self, id: &ElementId) -> Result<bool> {
        Ok(self.resolve(id)?.is_some())
    }

    /// `roots` plus every element they contain, transitively.
    ///
    /// Unknown elements are kept as they are.
    pub fn expand<'a>(&self, roots: impl IntoIterator<Item = &'a ElementId>) -> Result<BTreeSet<ElementId>> {
        let mut members = BTreeSet::new();
        let mut pending: Vec<ElementId> = roots.into_iter().cloned().collect();
        while let Some(id) = pending.pop() {
            if !members.insert(id.clone()) {
                continue;
            }
            if let Some(element) = self.resolve(&id)? {
                pending.extend(element.children.into_iter().filter(|c| !members.contains(c)));
            }
        }
        Ok(members)
    }

    /// `ids` plus every cached composite containing one of them,
    /// transitively.
    pub fn containing<'a>(&self, ids: impl IntoIterator<Item = &'a ElementId>) -> BTreeSet<ElementId> {
        let state = self.state.read();
        let mut found: BTreeSet<ElementId> = ids.into_iter().cloned().collect();
        let mut pending: Vec<ElementId> = found.iter().cloned().collect();
        while let Some(id) = pending.pop() {
            for parent in state.elements.values().filter(|e| e.children.contains(&id)) {
                if found.insert(parent.id.clone()) {
                    pending.push(parent.id.clone());
                }
            }
        }
        found
    }

    /// Cached element, without asking the controller.
    pub fn get(&self, id: &ElementId) -> Option<NetworkElement> {
        self.state.read().elements.get(id).cloned()
    }

    pub fn elements(&self) -> Vec<NetworkElement> {
        self.state.read().elements.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().elements.is_empty()
    }

    pub fn stats(&self) -> ElementRegistryStats {
        self.state.read().stats.clone()
    }

    /// Replaces the cache with the controller's view.
    pub fn rebuild(&self, elements: Vec<NetworkElement>) -> SyncDelta {
        let fresh: BTreeMap<ElementId, NetworkElement> =
            elements.into_iter().map(|e| (e.id.clone(), e)).collect();

        let mut state = self.state.write();
        let mut delta = SyncDelta::default();
        for (id, element) in &fresh {
            match state.elements.get(id) {
                None => delta.added += 1,
                Some(cached) if cached != element => delta.updated += 1,
                Some(_) => {}
            }
        }
        delta.removed = state.elements.keys().filter(|id| !fresh.contains_key(*id)).count();
        state.elements = fresh;

        debug_log!(SOURCE, delta = %delta, "Element cache rebuilt");
        delta
    }
}

//! Inspection port management logic.

use super::types::PortManagerStats;
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::element::ElementRegistry;
use crate::error::{RedirectionError, Result};
use crate::{audit_log, debug_log, error_log, info_log, warn_log};
use parking_lot::RwLock;
use redirect_driver::{DriverError, RedirectionDriver};
use redirect_orch_common::{IndexedMap, SyncDelta};
use redirect_types::{ElementId, InspectionPortElement, InspectionPortKey};
use std::sync::Arc;

const SOURCE: &str = "PortManager";

#[derive(Default)]
struct PortState {
    /// Port element id -> port, with the (ingress, egress) pair as secondary key
    ports: IndexedMap<ElementId, InspectionPortKey, InspectionPortElement>,
    stats: PortManagerStats,
}

/// Cache of the controller's inspection ports.
pub struct PortManager {
    driver: Arc<dyn RedirectionDriver>,
    elements: Arc<ElementRegistry>,
    state: RwLock<PortState>,
}

impl PortManager {
    pub fn new(driver: Arc<dyn RedirectionDriver>, elements: Arc<ElementRegistry>) -> Self {
        Self {
            driver,
            elements,
            state: RwLock::new(PortState::default()),
        }
    }

    fn driver_failed(&self, action: &str, object: &str, err: DriverError) -> RedirectionError {
        self.state.write().stats.driver_errors += 1;
        error_log!(SOURCE, action, object, error = %err, "Driver call failed");
        audit_log!(AuditRecord::new(AuditCategory::DriverOperation, SOURCE, action)
            .with_object_id(object)
            .with_object_type("inspection_port")
            .with_error(err.to_string()));
        RedirectionError::Backend(err)
    }

    /// Checks that both ends of `key` exist in the element registry.
    fn check_ends(&self, key: &InspectionPortKey) -> Result<()> {
        for end in [&key.ingress, &key.egress] {
            if !self.elements.exists(end)? {
                return Err(RedirectionError::port_not_found(format!(
                    "element {} of inspection port {}",
                    end, key
                )));
            }
        }
        Ok(())
    }

    /// Registers an inspection port and returns its element id.
    ///
    /// Registering the same (ingress, egress) pair again returns the same id
    /// without creating anything.
    pub fn register(&self, port: &InspectionPortElement) -> Result<ElementId> {
        self.register_tracked(port).map(|(id, _)| id)
    }

    /// Like [`register`](Self::register), also reporting whether this call
    /// created the port.
    pub(crate) fn register_tracked(&self, port: &InspectionPortElement) -> Result<(ElementId, bool)> {
        let key = port.key();
        debug_log!(SOURCE, pair = %key, "Registering inspection port");

        let existing = self.state.read().ports.key_for(&key).cloned();
        if let Some(id) = existing {
            self.state.write().stats.ports_reused += 1;
            debug_log!(SOURCE, id = %id, pair = %key, "Inspection port already registered");
            return Ok((id, false));
        }

        if let Err(e) = self.check_ends(&key) {
            audit_log!(AuditRecord::new(AuditCategory::ResourceCreate, SOURCE, "register_port")
                .with_object_id(key.to_string())
                .with_object_type("inspection_port")
                .with_error(e.to_string()));
            return Err(e);
        }

        let id = self
            .driver
            .create_inspection_port(&key)
            .map_err(|e| self.driver_failed("create_inspection_port", &key.to_string(), e))?;

        let registered = InspectionPortElement::new(key.ingress.clone(), key.egress.clone())
            .with_element_id(id.clone());

        let created = {
            let mut state = self.state.write();
            // A concurrent registration of the same pair may have won; the
            // controller returned the same id to both.
            if state.ports.contains_key(&id) {
                state.stats.ports_reused += 1;
                false
            } else if state.ports.insert(id.clone(), key.clone(), registered).is_err() {
                return Err(RedirectionError::conflict(format!(
                    "inspection port {} registered under another id",
                    key
                )));
            } else {
                state.stats.ports_registered += 1;
                true
            }
        };

        if created {
            info_log!(SOURCE, id = %id, pair = %key, "Inspection port registered");
            audit_log!(AuditRecord::new(AuditCategory::ResourceCreate, SOURCE, "register_port")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(id.as_str())
                .with_object_type("inspection_port")
                .with_details(serde_json::json!({
                    "ingress": key.ingress.as_str(),
                    "egress": key.egress.as_str(),
                })));
        }

        Ok((id, created))
    }

    /// Removes an inspection port by its (ingress, egress) pair.
    ///
    /// A pair missing from the cache is looked up on the controller, so a
    /// port whose creation reply was lost is still removed. Absent ports are
    /// a no-op. Fails with `PortNotFound` only when the ingress or egress
    /// element itself does not exist.
    pub fn remove(&self, port: &InspectionPortElement) -> Result<()> {
        let key = port.key();
        debug_log!(SOURCE, pair = %key, "Removing inspection port");

        if let Err(e) = self.check_ends(&key) {
            audit_log!(AuditRecord::new(AuditCategory::ResourceDelete, SOURCE, "remove_port")
                .with_object_id(key.to_string())
                .with_object_type("inspection_port")
                .with_error(e.to_string()));
            return Err(e);
        }

        let cached = self.state.read().ports.key_for(&key).cloned();
        let id = match cached {
            Some(id) => Some(id),
            None => self.learn(&key)?,
        };
        match id {
            Some(id) => self.remove_by_id(&id),
            None => {
                debug_log!(SOURCE, pair = %key, "Inspection port already absent");
                Ok(())
            }
        }
    }

    /// Asks the controller for a pair missing from the cache and caches the
    /// port it holds, if any.
    fn learn(&self, key: &InspectionPortKey) -> Result<Option<ElementId>> {
        let found = self
            .driver
            .lookup_inspection_port(key)
            .map_err(|e| self.driver_failed("lookup_inspection_port", &key.to_string(), e))?;
        let Some(id) = found.as_ref().and_then(|p| p.element_id.clone()) else {
            return Ok(None);
        };

        let mut state = self.state.write();
        if !state.ports.contains_key(&id) {
            if let Some(port) = found {
                if state.ports.insert(id.clone(), key.clone(), port).is_ok() {
                    state.stats.ports_learned += 1;
                    debug_log!(SOURCE, id = %id, pair = %key, "Learned inspection port from controller");
                }
            }
        }
        Ok(Some(id))
    }

    /// Removes an inspection port by element id. Only cached ports are
    /// removed; absent ports are a no-op.
    pub fn remove_by_id(&self, id: &ElementId) -> Result<()> {
        if !self.state.read().ports.contains_key(id) {
            return Ok(());
        }

        match self.driver.delete_inspection_port(id) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                warn_log!(SOURCE, id = %id, "Controller no longer holds inspection port");
            }
            Err(e) => return Err(self.driver_failed("delete_inspection_port", id.as_str(), e)),
        }

        let removed = {
            let mut state = self.state.write();
            let removed = state.ports.remove(id);
            if removed.is_some() {
                state.stats.ports_removed += 1;
            }
            removed
        };

        if let Some(port) = removed {
            audit_log!(AuditRecord::new(AuditCategory::ResourceDelete, SOURCE, "remove_port")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(id.as_str())
                .with_object_type("inspection_port")
                .with_details(serde_json::json!({
                    "ingress": port.ingress_port.as_str(),
                    "egress": port.egress_port.as_str(),
                })));
        }
        Ok(())
    }

    /// Returns the registered port with this (ingress, egress) pair.
    pub fn get(&self, port: &InspectionPortElement) -> Option<InspectionPortElement> {
        self.state.read().ports.get_by_secondary(&port.key()).cloned()
    }

    pub fn get_by_id(&self, id: &ElementId) -> Option<InspectionPortElement> {
        self.state.read().ports.get(id).cloned()
    }

    /// Resolves a caller-supplied port to its registered form.
    ///
    /// A port carrying an element id is looked up by id, and the pair must
    /// match; otherwise the pair is used.
    pub fn resolve(&self, port: &InspectionPortElement) -> Result<InspectionPortElement> {
        let found = match &port.element_id {
            Some(id) => self.get_by_id(id).filter(|p| p.key() == port.key()),
            None => self.get(port),
        };
        found.ok_or_else(|| {
            RedirectionError::port_not_found(match &port.element_id {
                Some(id) => format!("inspection port {} ({})", id, port.key()),
                None => format!("inspection port {}", port.key()),
            })
        })
    }

    pub fn ports(&self) -> Vec<InspectionPortElement> {
        self.state.read().ports.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().ports.is_empty()
    }

    pub fn stats(&self) -> PortManagerStats {
        self.state.read().stats.clone()
    }

    /// Replaces the cache with the controller's view.
    ///
    /// Ports without an element id, or whose pair appears twice, are skipped.
    pub fn rebuild(&self, ports: Vec<InspectionPortElement>) -> SyncDelta {
        let mut fresh = IndexedMap::new();
        for port in ports {
            let Some(id) = port.element_id.clone() else {
                warn_log!(SOURCE, pair = %port.key(), "Skipping inspection port without id");
                continue;
            };
            if fresh.insert(id.clone(), port.key(), port).is_err() {
                warn_log!(SOURCE, id = %id, "Skipping duplicate inspection port");
            }
        }

        let mut state = self.state.write();
        let mut delta = SyncDelta::default();
        for (id, port) in fresh.iter() {
            match state.ports.get(id) {
                None => delta.added += 1,
                Some(cached) if cached != port => delta.updated += 1,
                Some(_) => {}
            }
        }
        delta.removed = state.ports.keys().filter(|id| !fresh.contains_key(id)).count();
        state.ports = fresh;

        debug_log!(SOURCE, delta = %delta, "Inspection port cache rebuilt");
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use redirect_driver::{DriverOp, MockDriver};

    fn id(s: &str) -> ElementId {
        s.parse().unwrap()
    }

    fn manager() -> (Arc<MockDriver>, PortManager) {
        let driver = Arc::new(MockDriver::with_ports(["p1", "p2", "p3"]));
        driver.connect().unwrap();
        let elements = Arc::new(ElementRegistry::new(driver.clone()));
        (driver.clone(), PortManager::new(driver, elements))
    }

    #[test]
    fn test_register_is_idempotent() {
        let (driver, ports) = manager();
        let port = InspectionPortElement::symmetric(id("p3"));

        let a = ports.register(&port).unwrap();
        let b = ports.register(&port).unwrap();

        assert_eq!(a, b);
        assert_eq!(ports.len(), 1);
        assert_eq!(driver.call_count(DriverOp::CreateInspectionPort), 1);
        assert_eq!(ports.stats().ports_reused, 1);
    }

    #[test]
    fn test_register_unknown_end() {
        let (_, ports) = manager();
        let err = ports
            .register(&InspectionPortElement::new(id("p1"), id("ghost")))
            .unwrap_err();
        assert!(matches!(err, RedirectionError::PortNotFound(_)));
    }

    #[test]
    fn test_remove_semantics() {
        let (_, ports) = manager();
        let port = InspectionPortElement::new(id("p1"), id("p2"));

        // Absent but valid references: no-op.
        ports.remove(&port).unwrap();

        ports.register(&port).unwrap();
        ports.remove(&port).unwrap();
        ports.remove(&port).unwrap();
        assert!(ports.get(&port).is_none());

        let err = ports
            .remove(&InspectionPortElement::symmetric(id("ghost")))
            .unwrap_err();
        assert!(matches!(err, RedirectionError::PortNotFound(_)));
    }

    #[test]
    fn test_remove_after_lost_create_reply() {
        let (driver, ports) = manager();
        let port = InspectionPortElement::symmetric(id("p3"));
        driver.fail_after_apply(DriverOp::CreateInspectionPort, DriverError::unreachable("mock"));
        assert!(ports.register(&port).is_err());
        assert!(ports.get(&port).is_none());
        assert_eq!(driver.snapshot().unwrap().ports.len(), 1);

        ports.remove(&port).unwrap();
        assert!(driver.snapshot().unwrap().ports.is_empty());
        assert!(ports.is_empty());
        assert_eq!(ports.stats().ports_learned, 1);
        assert_eq!(ports.stats().ports_removed, 1);

        ports.remove(&port).unwrap();
        assert_eq!(driver.call_count(DriverOp::DeleteInspectionPort), 1);
    }

    #[test]
    fn test_resolve_by_id_and_pair() {
        let (_, ports) = manager();
        let port = InspectionPortElement::symmetric(id("p3"));
        let pid = ports.register(&port).unwrap();

        let by_pair = ports.resolve(&port).unwrap();
        let by_id = ports.resolve(&port.clone().with_element_id(pid.clone())).unwrap();
        assert_eq!(by_pair, by_id);
        assert_eq!(by_pair.element_id, Some(pid.clone()));

        let mismatched = InspectionPortElement::symmetric(id("p1")).with_element_id(pid);
        assert!(ports.resolve(&mismatched).is_err());
    }

    #[test]
    fn test_remove_driver_not_found_is_noop() {
        let (driver, ports) = manager();
        let port = InspectionPortElement::symmetric(id("p3"));
        ports.register(&port).unwrap();

        driver.fail_next(
            DriverOp::DeleteInspectionPort,
            DriverError::not_found("inspection port"),
        );
        ports.remove(&port).unwrap();
        assert!(ports.is_empty());
    }
}

//! Redirection controller facade.

use super::types::{ControllerStats, ReconcileReport, RedirectionControllerConfig};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::element::ElementRegistry;
use crate::error::{RedirectionError, Result};
use crate::hook::HookManager;
use crate::port::PortManager;
use crate::{audit_log, debug_log, error_log, info_log, warn_log};
use redirect_driver::{DriverCapabilities, RedirectionDriver};
use redirect_types::{
    ElementId, FailurePolicyType, HookId, HookParams, InspectionHookElement, InspectionPortElement,
    NetworkElement,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

const SOURCE: &str = "RedirectionController";

/// Traffic redirection control over one controller session.
pub struct RedirectionController {
    config: RedirectionControllerConfig,
    driver: Arc<dyn RedirectionDriver>,
    elements: Arc<ElementRegistry>,
    ports: Arc<PortManager>,
    hooks: HookManager,
    closed: AtomicBool,
    reconciliations: AtomicU64,
    rollbacks: AtomicU64,
}

impl RedirectionController {
    /// Connects the driver and builds the managers on top of it.
    ///
    /// With `reconcile_on_open` the caches are filled from the controller
    /// before returning. If that fails the session is released again and the
    /// error returned.
    pub fn open(driver: Arc<dyn RedirectionDriver>, config: RedirectionControllerConfig) -> Result<Self> {
        info_log!(SOURCE, name = %config.name, driver = driver.name(), "Opening redirection controller");

        if let Err(e) = driver.connect() {
            error_log!(SOURCE, name = %config.name, error = %e, "Failed to connect driver");
            audit_log!(AuditRecord::new(AuditCategory::SystemLifecycle, SOURCE, "open")
                .with_object_id(config.name.as_str())
                .with_object_type("controller")
                .with_error(e.to_string()));
            return Err(RedirectionError::Backend(e));
        }

        let elements = Arc::new(ElementRegistry::new(driver.clone()));
        let ports = Arc::new(PortManager::new(driver.clone(), elements.clone()));
        let hooks = HookManager::new(driver.clone(), elements.clone(), ports.clone());
        let controller = Self {
            config,
            driver,
            elements,
            ports,
            hooks,
            closed: AtomicBool::new(false),
            reconciliations: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
        };

        // On error, dropping `controller` releases the session.
        if controller.config.reconcile_on_open {
            controller.reconcile()?;
        }

        audit_log!(AuditRecord::new(AuditCategory::SystemLifecycle, SOURCE, "open")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(controller.config.name.as_str())
            .with_object_type("controller")
            .with_details(serde_json::json!({
                "driver": controller.driver.name(),
                "reconciled": controller.config.reconcile_on_open,
            })));

        Ok(controller)
    }

    /// Releases the driver session.
    pub fn close(self) -> Result<()> {
        self.release()
    }

    fn release(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let result = self.driver.disconnect();
        let mut record = AuditRecord::new(AuditCategory::SystemLifecycle, SOURCE, "close")
            .with_object_id(self.config.name.as_str())
            .with_object_type("controller");
        record = match &result {
            Ok(()) => record.with_outcome(AuditOutcome::Success),
            Err(e) => record.with_error(e.to_string()),
        };
        audit_log!(record);

        match result {
            Ok(()) => {
                info_log!(SOURCE, name = %self.config.name, "Redirection controller closed");
                Ok(())
            }
            Err(e) => {
                error_log!(SOURCE, name = %self.config.name, error = %e, "Failed to disconnect driver");
                Err(RedirectionError::Backend(e))
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn driver_name(&self) -> &str {
        self.driver.name()
    }

    pub fn capabilities(&self) -> DriverCapabilities {
        self.driver.capabilities()
    }

    // Network elements

    pub fn register_network_element(&self, children: &[ElementId]) -> Result<NetworkElement> {
        self.elements.register(children)
    }

    pub fn update_network_element(&self, id: &ElementId, children: &[ElementId]) -> Result<NetworkElement> {
        self.elements.update(id, children)
    }

    /// Deletes an element. Unknown elements are a no-op; elements still
    /// inspected by a hook or used by an inspection port are refused.
    pub fn delete_network_element(&self, id: &ElementId) -> Result<()> {
        let in_use = if self.hooks.is_inspected(id) {
            Some("inspected by a hook")
        } else if self.ports.ports().iter().any(|p| p.references(id)) {
            Some("used by an inspection port")
        } else {
            None
        };

        if let Some(reason) = in_use {
            warn_log!(SOURCE, id = %id, reason, "Refusing to delete element in use");
            audit_log!(AuditRecord::new(AuditCategory::ResourceDelete, SOURCE, "delete_element")
                .with_outcome(AuditOutcome::Denied)
                .with_object_id(id.as_str())
                .with_object_type("network_element")
                .with_error(reason));
            return Err(RedirectionError::conflict(format!("element {} is {}", id, reason)));
        }
        self.elements.delete(id)
    }

    /// Children of an element, or `None` if it is unknown.
    pub fn get_network_elements(&self, id: &ElementId) -> Result<Option<Vec<ElementId>>> {
        self.elements.list(id)
    }

    // Inspection ports

    pub fn register_inspection_port(&self, port: &InspectionPortElement) -> Result<ElementId> {
        self.ports.register(port)
    }

    /// Removes an inspection port. Ports still used by a hook are refused.
    pub fn remove_inspection_port(&self, port: &InspectionPortElement) -> Result<()> {
        let registered = self.ports.get(port).and_then(|p| p.element_id);
        if let Some(id) = registered.filter(|id| self.hooks.is_port_in_use(id)) {
            warn_log!(SOURCE, port = %id, "Refusing to remove inspection port in use");
            audit_log!(AuditRecord::new(AuditCategory::ResourceDelete, SOURCE, "remove_port")
                .with_outcome(AuditOutcome::Denied)
                .with_object_id(id.as_str())
                .with_object_type("inspection_port")
                .with_error("used by an inspection hook"));
            return Err(RedirectionError::conflict(format!(
                "inspection port {} is used by an inspection hook",
                id
            )));
        }
        self.ports.remove(port)
    }

    pub fn get_inspection_port(&self, port: &InspectionPortElement) -> Option<InspectionPortElement> {
        self.ports.get(port)
    }

    // Inspection hooks

    pub fn install_inspection_hook(
        &self,
        inspected: &[ElementId],
        port: &InspectionPortElement,
        params: HookParams,
    ) -> Result<HookId> {
        self.hooks.install(inspected, port, params)
    }

    pub fn remove_inspection_hook(&self, inspected: &[ElementId], port: &InspectionPortElement) -> Result<()> {
        self.hooks.remove(inspected, port)
    }

    pub fn remove_inspection_hook_by_id(&self, id: &HookId) -> Result<()> {
        self.hooks.remove_by_id(id)
    }

    pub fn get_inspection_hook(&self, id: &HookId) -> Option<InspectionHookElement> {
        self.hooks.get(id)
    }

    /// The hook inspecting `inspected` through `port`.
    pub fn get_inspection_hook_for(
        &self,
        inspected: &ElementId,
        port: &InspectionPortElement,
    ) -> Option<InspectionHookElement> {
        self.hooks.get_by_pair(inspected, port)
    }

    /// Removes every hook inspecting `element`; returns how many.
    pub fn remove_all_inspection_hooks(&self, element: &ElementId) -> Result<usize> {
        self.hooks.remove_all_for(element)
    }

    pub fn set_inspection_hook_tag(&self, inspected: &ElementId, port: &InspectionPortElement, tag: u64) -> Result<()> {
        self.hooks.set_tag(inspected, port, tag)
    }

    pub fn get_inspection_hook_tag(&self, inspected: &ElementId, port: &InspectionPortElement) -> Result<Option<u64>> {
        self.hooks.get_tag(inspected, port)
    }

    pub fn set_inspection_hook_order(
        &self,
        inspected: &ElementId,
        port: &InspectionPortElement,
        order: u64,
    ) -> Result<()> {
        self.hooks.set_order(inspected, port, order)
    }

    pub fn get_inspection_hook_order(&self, inspected: &ElementId, port: &InspectionPortElement) -> Result<Option<u64>> {
        self.hooks.get_order(inspected, port)
    }

    pub fn set_inspection_hook_failure_policy(
        &self,
        inspected: &ElementId,
        port: &InspectionPortElement,
        policy: FailurePolicyType,
    ) -> Result<()> {
        self.hooks.set_failure_policy(inspected, port, policy)
    }

    pub fn get_inspection_hook_failure_policy(
        &self,
        inspected: &ElementId,
        port: &InspectionPortElement,
    ) -> Result<Option<FailurePolicyType>> {
        self.hooks.get_failure_policy(inspected, port)
    }

    pub fn update_inspection_hook(&self, snapshot: &InspectionHookElement) -> Result<()> {
        self.hooks.update(snapshot)
    }

    /// Registers `port` if needed and installs a hook on it.
    ///
    /// A port registered by this call is removed again if the install fails.
    pub fn redirect(
        &self,
        inspected: &[ElementId],
        port: &InspectionPortElement,
        params: HookParams,
    ) -> Result<HookId> {
        let correlation = format!("redirect-{}", Uuid::new_v4());
        debug_log!(SOURCE, port = %port.key(), order = params.order, correlation = %correlation, "Redirecting through inspection port");

        let (port_id, created) = match self.ports.register_tracked(port) {
            Ok(registered) => registered,
            Err(e) => {
                audit_log!(AuditRecord::new(AuditCategory::ResourceCreate, SOURCE, "redirect")
                    .with_object_id(port.key().to_string())
                    .with_object_type("inspection_port")
                    .with_error(e.to_string())
                    .with_correlation_id(correlation.as_str()));
                return Err(e);
            }
        };
        audit_log!(AuditRecord::new(AuditCategory::ResourceCreate, SOURCE, "redirect")
            .with_object_id(port_id.as_str())
            .with_object_type("inspection_port")
            .with_details(serde_json::json!({ "created": created }))
            .with_correlation_id(correlation.as_str()));

        let registered = InspectionPortElement::new(port.ingress_port.clone(), port.egress_port.clone())
            .with_element_id(port_id.clone());

        let err = match self.hooks.install(inspected, &registered, params) {
            Ok(hook_id) => {
                audit_log!(AuditRecord::new(AuditCategory::ResourceCreate, SOURCE, "redirect")
                    .with_outcome(AuditOutcome::Success)
                    .with_object_id(hook_id.as_str())
                    .with_object_type("inspection_hook")
                    .with_details(serde_json::json!({ "inspection_port": port_id.as_str() }))
                    .with_correlation_id(correlation.as_str()));
                return Ok(hook_id);
            }
            Err(e) => e,
        };
        audit_log!(AuditRecord::new(AuditCategory::ResourceCreate, SOURCE, "redirect")
            .with_object_id(port_id.as_str())
            .with_object_type("inspection_hook")
            .with_error(err.to_string())
            .with_correlation_id(correlation.as_str()));

        // Another caller may have hooked the port meanwhile.
        if created && !self.hooks.is_port_in_use(&port_id) {
            match self.ports.remove_by_id(&port_id) {
                Ok(()) => {
                    self.rollbacks.fetch_add(1, Ordering::Relaxed);
                    warn_log!(SOURCE, port = %port_id, error = %err, "Hook install failed, port registration rolled back");
                    audit_log!(AuditRecord::new(AuditCategory::ResourceDelete, SOURCE, "redirect_rollback")
                        .with_outcome(AuditOutcome::Success)
                        .with_object_id(port_id.as_str())
                        .with_object_type("inspection_port")
                        .with_correlation_id(correlation.as_str()));
                }
                Err(rollback) => {
                    error_log!(SOURCE, port = %port_id, error = %rollback, "Failed to roll back port registration");
                    audit_log!(AuditRecord::new(AuditCategory::ErrorCondition, SOURCE, "redirect_rollback")
                        .with_object_id(port_id.as_str())
                        .with_object_type("inspection_port")
                        .with_error(rollback.to_string())
                        .with_correlation_id(correlation.as_str()));
                }
            }
        }
        Err(err)
    }

    // Queries

    /// Hooks inspecting `element` in evaluation order.
    pub fn inspection_chain(&self, element: &ElementId) -> Vec<InspectionHookElement> {
        self.hooks.inspection_chain(element)
    }

    pub fn inspection_ports_for(&self, element: &ElementId) -> Vec<InspectionPortElement> {
        self.hooks.inspection_ports_for(element)
    }

    pub fn inspected_elements_for(&self, port: &InspectionPortElement) -> Option<Vec<ElementId>> {
        self.hooks.inspected_elements_for(port)
    }

    pub fn inspection_hooks(&self) -> Vec<InspectionHookElement> {
        self.hooks.hooks()
    }

    pub fn inspection_ports(&self) -> Vec<InspectionPortElement> {
        self.ports.ports()
    }

    /// Rebuilds every cache from the controller's current state.
    ///
    /// Run after a call whose outcome is unknown (a lost reply, a caller
    /// timeout) and before retrying it. Concurrent mutations are not
    /// serialized against a rebuild.
    pub fn reconcile(&self) -> Result<ReconcileReport> {
        debug_log!(SOURCE, name = %self.config.name, "Reconciling with controller");

        let snapshot = match self.driver.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error_log!(SOURCE, name = %self.config.name, error = %e, "Failed to read controller state");
                audit_log!(AuditRecord::new(AuditCategory::Reconciliation, SOURCE, "reconcile")
                    .with_object_id(self.config.name.as_str())
                    .with_object_type("controller")
                    .with_error(e.to_string()));
                return Err(RedirectionError::Backend(e));
            }
        };

        let report = ReconcileReport {
            elements: self.elements.rebuild(snapshot.elements),
            ports: self.ports.rebuild(snapshot.ports),
            hooks: self.hooks.rebuild(snapshot.hooks),
        };
        self.reconciliations.fetch_add(1, Ordering::Relaxed);

        info_log!(
            SOURCE,
            elements = %report.elements,
            ports = %report.ports,
            hooks = %report.hooks,
            "Reconciled with controller"
        );
        audit_log!(AuditRecord::new(AuditCategory::Reconciliation, SOURCE, "reconcile")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(self.config.name.as_str())
            .with_object_type("controller")
            .with_details(serde_json::to_value(report).unwrap_or_default()));

        Ok(report)
    }

    pub fn stats(&self) -> ControllerStats {
        ControllerStats {
            elements: self.elements.stats(),
            ports: self.ports.stats(),
            hooks: self.hooks.stats(),
            reconciliations: self.reconciliations.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
        }
    }
}

impl Drop for RedirectionController {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn_log!(SOURCE, name = %self.config.name, error = %e, "Driver session not released cleanly");
        }
    }
}

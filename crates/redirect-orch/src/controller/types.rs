use crate::element::ElementRegistryStats;
use crate::hook::HookManagerStats;
use crate::port::PortManagerStats;
use redirect_orch_common::SyncDelta;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct RedirectionControllerConfig {
    /// Name used in logs and audit records
    pub name: String,
    /// Rebuild the caches from the controller right after connecting.
    pub reconcile_on_open: bool,
}

impl RedirectionControllerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_reconcile_on_open(mut self, reconcile: bool) -> Self {
        self.reconcile_on_open = reconcile;
        self
    }
}

impl Default for RedirectionControllerConfig {
    fn default() -> Self {
        Self {
            name: "redirection".to_string(),
            reconcile_on_open: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ControllerStats {
    pub elements: ElementRegistryStats,
    pub ports: PortManagerStats,
    pub hooks: HookManagerStats,
    pub reconciliations: u64,
    /// Ports registered by `redirect` and removed again after a failed install
    pub rollbacks: u64,
}

/// What a reconciliation changed in each cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub elements: SyncDelta,
    pub ports: SyncDelta,
    pub hooks: SyncDelta,
}

impl ReconcileReport {
    /// Returns true if every cache already matched the controller.
    pub fn is_clean(&self) -> bool {
        self.elements.is_empty() && self.ports.is_empty() && self.hooks.is_empty()
    }
}

use redirect_types::{ElementId, InspectedSet};
use serde::Serialize;
use std::fmt;

/// Natural identity of a hook: what it inspects and through which port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookKey {
    pub inspected: InspectedSet,
    /// Element id of the registered inspection port
    pub port: ElementId,
}

impl HookKey {
    pub fn new(inspected: InspectedSet, port: ElementId) -> Self {
        Self { inspected, port }
    }
}

impl fmt::Display for HookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.inspected, self.port)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HookManagerStats {
    pub hooks_installed: u64,
    /// Installs that matched an identical existing hook
    pub hooks_reused: u64,
    pub hooks_removed: u64,
    pub hooks_updated: u64,
    /// Requests refused by a consistency check
    pub conflicts: u64,
    pub driver_errors: u64,
}

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PortManagerStats {
    pub ports_registered: u64,
    /// Registrations answered from the cache
    pub ports_reused: u64,
    pub ports_removed: u64,
    /// Ports found on the controller but missing from the cache
    pub ports_learned: u64,
    pub driver_errors: u64,
}

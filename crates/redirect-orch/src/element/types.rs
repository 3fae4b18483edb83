use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ElementRegistryStats {
    pub composites_created: u64,
    pub composites_updated: u64,
    pub elements_deleted: u64,
    /// Leaf elements learned from the controller on lookup
    pub elements_learned: u64,
    pub driver_errors: u64,
}

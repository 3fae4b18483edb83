//! ElementRegistry - network elements and their ordered composition.
//!
//! Leaf elements (controller ports) are provisioned outside the redirection
//! layer and learned on first lookup. Composites are created here; their
//! child order is the traffic path.

mod orch;
mod types;

pub use orch::ElementRegistry;
pub use types::ElementRegistryStats;

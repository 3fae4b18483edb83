//! PortManager - inspection ports.
//!
//! An inspection port is the directed (ingress, egress) path through an
//! inspection device. Its identity is the pair; the controller assigns the
//! element id on first registration and returns the same id afterwards.

mod orch;
mod types;

pub use orch::PortManager;
pub use types::PortManagerStats;

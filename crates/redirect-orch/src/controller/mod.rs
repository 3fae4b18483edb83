//! RedirectionController - the facade callers use.
//!
//! Owns one driver session and the three managers sharing it. The session
//! is opened by [`RedirectionController::open`] and released exactly once,
//! by [`RedirectionController::close`] or on drop.
//!
//! Operations spanning managers (deleting an element that hooks still
//! inspect, removing a port hooks still use, registering a port and
//! installing a hook on it) are checked and sequenced here.

mod orch;
mod types;

pub use orch::RedirectionController;
pub use types::{ControllerStats, ReconcileReport, RedirectionControllerConfig};

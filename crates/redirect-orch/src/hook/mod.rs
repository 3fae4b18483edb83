//! HookManager - inspection hooks.
//!
//! A hook binds a set of inspected elements to one inspection port. It can
//! be addressed by the id the controller assigned or by its
//! (inspected set, inspection port) key; both resolve to the same record.
//!
//! # Ordering
//!
//! Hooks on a shared inspected element are evaluated by ascending `order`,
//! ties broken by hook id. Two hooks whose inspected sets overlap may not
//! share an `order`: the second install (or re-order) is refused with
//! `Conflict`, so installed hooks never move.
//!
//! # Concurrency
//!
//! Every mutation holds the per-element locks of the hook's inspected set
//! for the whole operation, including the driver call. Hooks on disjoint
//! elements are programmed in parallel.

mod orch;
mod types;

pub use orch::HookManager;
pub use types::{HookKey, HookManagerStats};

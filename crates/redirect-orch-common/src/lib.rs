//! Common orchestration building blocks for traffic redirection.
//!
//! - [`IndexedMap`]: Map with a unique secondary key that never
//!   auto-vivifies entries
//! - [`ReverseIndex`]: Reference tracking from a referenced object to the
//!   keys that use it
//! - [`KeyedLock`]: Per-key mutual exclusion with all-or-nothing
//!   acquisition of several keys
//! - [`SyncDelta`]: Change counts from rebuilding a cache

mod indexed_map;
mod key_lock;
mod reverse_index;
mod sync_delta;

pub use indexed_map::{IndexedMap, IndexedMapError};
pub use key_lock::{KeyedGuard, KeyedLock};
pub use reverse_index::ReverseIndex;
pub use sync_delta::SyncDelta;

//! Change counts produced when a cache is rebuilt from its source of truth.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a cache rebuild changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDelta {
    pub added: usize,
    pub removed: usize,
    pub updated: usize,
}

impl SyncDelta {
    /// Returns true if the cache already matched.
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.updated == 0
    }

    pub fn total(&self) -> usize {
        self.added + self.removed + self.updated
    }
}

impl fmt::Display for SyncDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{} -{} ~{}", self.added, self.removed, self.updated)
    }
}

//! Cache statistics snapshot.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Point-in-time view of the frame cache counters.
///
/// `hits`, `misses` and `evictions` accumulate for the life of the process
/// (or until an explicit reset); the byte and entry fields track current
/// occupancy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub memory_bytes: u64,
    pub memory_entries: u64,
    pub memory_capacity_bytes: u64,
    pub disk_bytes: u64,
    pub disk_entries: u64,
    pub disk_capacity_bytes: u64,
}

impl CacheStatistics {
    /// Fraction of lookups served from either tier (0.0 with no lookups).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Total lookups recorded.
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }
}

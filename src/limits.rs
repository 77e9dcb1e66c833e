use serde::{Deserialize, Serialize};

/// Per-isolate heap limits and collection policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolateLimits {
    /// Maximum number of live heap values. Reaching it forces a collection
    /// before allocation fails.
    pub max_heap_values: usize,

    /// Run a collection every N allocations (0 disables).
    pub gc_interval_allocations: usize,
}

impl Default for IsolateLimits {
    fn default() -> Self {
        Self {
            max_heap_values: 1 << 20,
            gc_interval_allocations: 0,
        }
    }
}

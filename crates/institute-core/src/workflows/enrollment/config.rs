use serde::{Deserialize, Serialize};

const DEFAULT_BATCH_CAPACITY: u32 = 15;
const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// Seats per batch and how many optimistic attempts an allocation gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatorConfig {
    pub batch_capacity: u32,
    pub max_attempts: u32,
}

impl AllocatorConfig {
    pub(crate) fn capacity(&self) -> u32 {
        self.batch_capacity.max(1)
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            batch_capacity: DEFAULT_BATCH_CAPACITY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

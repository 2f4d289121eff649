use serde::{Deserialize, Serialize};

const DEFAULT_QUEUE_LIMIT: usize = 50;

/// Paging for the manual review queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewConfig {
    pub queue_limit: usize,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            queue_limit: DEFAULT_QUEUE_LIMIT,
        }
    }
}

//! Engine configuration.

use std::time::Duration;
use trackflow_core::MAX_COMMENT_CHARS;

/// Tunables for [`crate::TrackEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound for any single store call
    pub store_timeout: Duration,
    /// Longest review comment accepted, in characters
    pub max_comment_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
            max_comment_chars: MAX_COMMENT_CHARS,
        }
    }
}

impl EngineConfig {
    /// Set the store timeout.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Set the comment limit. Values above the storage limit are clamped.
    pub fn with_max_comment_chars(mut self, max: usize) -> Self {
        self.max_comment_chars = max.min(MAX_COMMENT_CHARS);
        self
    }
}

//! Service configuration

use serde::{Deserialize, Serialize};

/// Row count used when a listing does not set a limit
pub const DEFAULT_LIMIT: usize = 100;

/// Configuration for the event query service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventStorageConfig {
    /// Limit applied when a listing does not set one
    pub default_limit: usize,
    /// Upper bound on any listing's limit; `None` disables the cap
    pub max_limit: Option<usize>,
}

impl Default for EventStorageConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: Some(10_000),
        }
    }
}

impl EventStorageConfig {
    /// The limit actually sent to the backend for a requested one
    pub fn effective_limit(&self, requested: Option<usize>) -> usize {
        let limit = requested.unwrap_or(self.default_limit);
        match self.max_limit {
            Some(max) => limit.min(max),
            None => limit,
        }
    }
}

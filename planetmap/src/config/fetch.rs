//! Tile fetch configuration.

use super::defaults::{
    DEFAULT_BACKOFF_BASE_MS, DEFAULT_MAX_RETRIES, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_WATCH_INTERVAL_MS,
};
use std::time::Duration;

/// Configuration for tile fetching.
///
/// # Example
///
/// ```
/// use planetmap::config::FetchConfig;
/// use std::time::Duration;
///
/// let config = FetchConfig::default();
/// assert_eq!(config.max_retries(), 3);
/// assert_eq!(config.request_timeout(), Duration::from_secs(30));
///
/// let config = FetchConfig::new()
///     .with_max_retries(5)
///     .with_request_timeout(Duration::from_secs(10));
/// assert_eq!(config.max_retries(), 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchConfig {
    /// Attempts per tile, including the first
    max_retries: u32,
    /// Timeout of a single attempt
    request_timeout: Duration,
    /// Scan interval of the fetch watcher
    watch_interval: Duration,
    /// Backoff before the second attempt; doubles per attempt
    backoff_base: Duration,
}

impl FetchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of attempts per tile. At least one attempt is always made.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    /// Set the per-attempt timeout. Timeouts are not retried.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn watch_interval(&self) -> Duration {
        self.watch_interval
    }

    /// Backoff after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base * (1u32 << attempt.min(16))
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            watch_interval: Duration::from_millis(DEFAULT_WATCH_INTERVAL_MS),
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
        }
    }
}

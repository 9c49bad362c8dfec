//! Configuration Module
//!
//! Handles loading timeouts and request jitter from environment variables.

use std::env;
use std::time::Duration;

/// Default store query timeout in milliseconds
pub const DEFAULT_PRODUCT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Default upper bound of the background request jitter in milliseconds
pub const DEFAULT_BACKGROUND_JITTER_MAX_MS: u64 = 5_000;

/// Coalescing layer configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum time a store catalog query may run before it is cancelled
    pub product_request_timeout: Duration,
    /// Upper bound of the random delay applied to backgrounded backend requests
    pub background_jitter_max: Duration,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `PRODUCT_REQUEST_TIMEOUT_MS` - Store query timeout (default: 30000)
    /// - `BACKGROUND_JITTER_MAX_MS` - Background jitter upper bound (default: 5000)
    pub fn from_env() -> Self {
        Self {
            product_request_timeout: Duration::from_millis(millis_from_env(
                "PRODUCT_REQUEST_TIMEOUT_MS",
                DEFAULT_PRODUCT_REQUEST_TIMEOUT_MS,
            )),
            background_jitter_max: Duration::from_millis(millis_from_env(
                "BACKGROUND_JITTER_MAX_MS",
                DEFAULT_BACKGROUND_JITTER_MAX_MS,
            )),
        }
    }

    /// Returns a copy with the given store query timeout.
    pub fn with_product_request_timeout(mut self, timeout: Duration) -> Self {
        self.product_request_timeout = timeout;
        self
    }

    /// Returns a copy with the given background jitter upper bound.
    pub fn with_background_jitter_max(mut self, jitter: Duration) -> Self {
        self.background_jitter_max = jitter;
        self
    }
}

fn millis_from_env(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            product_request_timeout: Duration::from_millis(DEFAULT_PRODUCT_REQUEST_TIMEOUT_MS),
            background_jitter_max: Duration::from_millis(DEFAULT_BACKGROUND_JITTER_MAX_MS),
        }
    }
}

//! Tracing setup
//!
//! Installs the process-wide tracing subscriber used by the coalescing layer.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "request_coalescer=info";

/// Initializes a tracing subscriber with an env filter and a fmt layer.
///
/// Defaults to [`DEFAULT_LOG_FILTER`], can be overridden with the `RUST_LOG`
/// env var. Calling this more than once is harmless: later calls return false
/// and leave the first subscriber in place.
pub fn init_tracing() -> bool {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

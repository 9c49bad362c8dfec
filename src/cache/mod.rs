//! Cache Module
//!
//! Generic coalescing engine shared by the backend and catalog caches:
//! keys, in-flight callback lists, cancellation handles and timeout supervision.

mod callback;
mod cancel;
mod key;
mod stats;
mod supervisor;


// Re-export public types
pub use callback::{CacheStatus, Callback, CallbackCache};
pub(crate) use callback::deliver_later;
pub use cancel::CancellationHandle;
pub use key::{CacheKey, IdentifierSet};
pub use stats::{CatalogStats, CoalescingStats};
pub use supervisor::{SupervisorState, TimeoutSupervisor};

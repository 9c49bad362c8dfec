//! Request Coalescer - client-side request coalescing and response caching
//!
//! Concurrent requests for the same resource share a single backend or store
//! call; product metadata is cached per identifier with bounded query time.

pub mod backend;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod layer;
pub mod telemetry;

pub use backend::{BackendConfiguration, HttpClient, OfferingsApi};
pub use cache::{CacheKey, CacheStatus, CallbackCache, CancellationHandle, IdentifierSet};
pub use catalog::{ProductCatalogCache, ProductSet, ProductStore, StoreProduct};
pub use config::Config;
pub use error::{FetchError, Result};
pub use layer::CoalescingLayer;

//! Catalog Module
//!
//! Store product metadata cache: per-identifier records, coalesced store
//! queries for the missing identifiers, and timeout-driven cancellation.

mod cache;
mod store;

pub use cache::ProductCatalogCache;
pub use store::{ProductSet, ProductStore, ProductsCompletion, StoreProduct};

//! Store Collaborator Module
//!
//! Narrow interface to the platform store API that answers product metadata queries.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::{CancellationHandle, IdentifierSet};
use crate::error::Result;

/// Products keyed by their store identifier.
pub type ProductSet<P> = BTreeMap<String, P>;

/// Completion handed to the store for one query.
pub type ProductsCompletion<P> = Box<dyn FnOnce(Result<Vec<P>>) + Send>;

// == Store Product ==
/// A product record as returned by the platform store.
pub trait StoreProduct: Clone + Send + Sync + 'static {
    /// Identifier the record is cached under.
    fn product_identifier(&self) -> &str;
}

// == Product Store ==
/// Executes product metadata queries against the platform store.
///
/// Implementations must invoke `completion` exactly once unless the returned
/// handle is cancelled first, and must tolerate `cancel()` at any time,
/// including after completion.
pub trait ProductStore: Send + Sync + 'static {
    type Product: StoreProduct;

    fn request_products(
        &self,
        identifiers: &IdentifierSet,
        completion: ProductsCompletion<Self::Product>,
    ) -> CancellationHandle;
}

impl<S: ProductStore + ?Sized> ProductStore for Arc<S> {
    type Product = S::Product;

    fn request_products(
        &self,
        identifiers: &IdentifierSet,
        completion: ProductsCompletion<Self::Product>,
    ) -> CancellationHandle {
        (**self).request_products(identifiers, completion)
    }
}

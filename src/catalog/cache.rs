//! Product Catalog Cache Module
//!
//! Caches store product records by identifier and coalesces concurrent store
//! queries for the same missing identifiers, each query bounded by a timeout.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::cache::{
    deliver_later, CacheStatus, CallbackCache, CancellationHandle, CatalogStats, IdentifierSet,
    TimeoutSupervisor,
};
use crate::catalog::{ProductSet, ProductStore, StoreProduct};
use crate::config::Config;
use crate::error::{FetchError, Result};

// == Cached Product ==
#[derive(Debug, Clone)]
struct CachedProduct<P> {
    product: P,
    cached_at: DateTime<Utc>,
}

struct CatalogState<P> {
    products: HashMap<String, CachedProduct<P>>,
    stats: CatalogStats,
}

impl<P: StoreProduct> CatalogState<P> {
    /// Splits `requested` into a full hit or the identifiers still missing.
    fn partition(&mut self, requested: &IdentifierSet) -> Partition<P> {
        self.stats.requests += 1;

        let missing = requested.filter(|id| !self.products.contains_key(id));
        if !missing.is_empty() {
            return Partition::Miss(missing);
        }

        self.stats.cache_hits += 1;
        Partition::Hit(
            requested
                .iter()
                .filter_map(|id| {
                    self.products
                        .get(id)
                        .map(|cached| (id.to_string(), cached.product.clone()))
                })
                .collect(),
        )
    }
}

/// Result of splitting a request against the store.
enum Partition<P> {
    /// Every identifier was cached
    Hit(ProductSet<P>),
    /// Identifiers that must be queried
    Miss(IdentifierSet),
}

struct Inner<S: ProductStore> {
    store: S,
    request_timeout: Duration,
    state: Mutex<CatalogState<S::Product>>,
    in_flight: CallbackCache<IdentifierSet, ProductSet<S::Product>>,
}

// == Product Catalog Cache ==
/// Fetches product metadata from a [`ProductStore`], caching records by identifier.
///
/// Records never expire; they stay valid until [`clear_cache`](Self::clear_cache).
/// Concurrent requests whose missing identifiers are identical share one store
/// query. The missing subset is computed against cached records only, so a
/// request for `{1,2,3,4}` issued while `{1,2,3}` is in flight starts its own
/// query for `{1,2,3,4}`.
///
/// Cloning is cheap and yields a handle to the same cache.
pub struct ProductCatalogCache<S: ProductStore> {
    inner: Arc<Inner<S>>,
}

impl<S: ProductStore> Clone for ProductCatalogCache<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: ProductStore> ProductCatalogCache<S> {
    // == Constructor ==
    /// Creates an empty catalog backed by `store`.
    ///
    /// # Arguments
    /// * `store` - Collaborator that executes store queries
    /// * `request_timeout` - Maximum duration of a single store query
    pub fn new(store: S, request_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                request_timeout,
                state: Mutex::new(CatalogState {
                    products: HashMap::new(),
                    stats: CatalogStats::new(),
                }),
                in_flight: CallbackCache::new(),
            }),
        }
    }

    /// Creates an empty catalog using the configured request timeout.
    pub fn from_config(store: S, config: &Config) -> Self {
        Self::new(store, config.product_request_timeout)
    }

    // == Products ==
    /// Resolves `identifiers` to product records and invokes `completion` exactly once.
    ///
    /// Cached identifiers never reach the store. An empty request, or one fully
    /// answered from the cache, is delivered from a spawned task, never on the
    /// calling thread; otherwise `completion` runs on the context that resolves
    /// the store query. Must be called from within a Tokio runtime.
    pub fn products<I, F>(&self, identifiers: I, completion: F)
    where
        I: IntoIterator,
        I::Item: Into<String>,
        F: FnOnce(Result<ProductSet<S::Product>>) + Send + 'static,
    {
        let requested: IdentifierSet = identifiers.into_iter().collect();
        if requested.is_empty() {
            debug!("empty product request, nothing to fetch");
            deliver_later(completion, Ok(ProductSet::new()));
            return;
        }

        // Lookup and registration share one state lock: a caller either joins
        // the running query or finds its records already merged.
        let mut state = self.inner.lock_state();
        let missing = match state.partition(&requested) {
            Partition::Hit(products) => {
                drop(state);
                debug!(identifiers = %requested, "all products cached");
                deliver_later(completion, Ok(products));
                return;
            }
            Partition::Miss(missing) => missing,
        };

        let inner = Arc::clone(&self.inner);
        let waiter = move |result: Result<ProductSet<S::Product>>| {
            completion(result.map(|fetched| inner.assemble(&requested, fetched)));
        };

        let status = self.inner.in_flight.add(missing.clone(), waiter);
        if status == CacheStatus::AddedToExistingList {
            state.stats.joined += 1;
        }
        drop(state);

        match status {
            CacheStatus::AddedToExistingList => {
                debug!(identifiers = %missing, "products already being fetched, waiting");
            }
            CacheStatus::FirstCallbackAddedToList => self.start_query(missing),
        }
    }

    /// Async form of [`products`](Self::products).
    pub async fn fetch<I>(&self, identifiers: I) -> Result<ProductSet<S::Product>>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let (sender, receiver) = oneshot::channel();
        self.products(identifiers, move |result| {
            sender.send(result).ok();
        });
        receiver
            .await
            .map_err(|_| FetchError::Internal("product request completion dropped".to_string()))?
    }

    /// Starts the store query for `missing` under a fresh timeout supervisor.
    fn start_query(&self, missing: IdentifierSet) {
        self.inner.lock_state().stats.queries_started += 1;
        info!(identifiers = %missing, "requesting products from store");

        // Attach our own handle first so a timeout can always reach the query.
        let cancellation = CancellationHandle::new();
        self.inner
            .in_flight
            .attach_cancellation(&missing, cancellation.clone());

        let supervisor = TimeoutSupervisor::new(self.inner.request_timeout);
        let inner = Arc::clone(&self.inner);
        let query_supervisor = Arc::clone(&supervisor);
        let key = missing.clone();
        let store_handle = self.inner.store.request_products(
            &missing,
            Box::new(move |result| inner.finish_query(&key, &query_supervisor, result)),
        );
        cancellation.link(store_handle);

        let inner = Arc::clone(&self.inner);
        supervisor.start(move || inner.expire_query(&missing));
    }

    // == Cache Product ==
    /// Inserts or overwrites one record outside the fetch flow.
    pub fn cache_product(&self, product: S::Product) {
        let id = product.product_identifier().to_string();
        self.inner.lock_state().products.insert(
            id,
            CachedProduct {
                product,
                cached_at: Utc::now(),
            },
        );
    }

    // == Clear Cache ==
    /// Empties the record store.
    ///
    /// Queries already in flight are not cancelled; their results are merged
    /// into the emptied store when they arrive.
    pub fn clear_cache(&self) {
        let mut state = self.inner.lock_state();
        let removed = state.products.len();
        state.products.clear();
        info!(removed, "product cache cleared");
    }

    /// Returns a copy of the cached record for `id`, if any.
    pub fn cached_product(&self, id: &str) -> Option<S::Product> {
        self.inner
            .lock_state()
            .products
            .get(id)
            .map(|cached| cached.product.clone())
    }

    /// Returns when the record for `id` was stored.
    pub fn cached_at(&self, id: &str) -> Option<DateTime<Utc>> {
        self.inner
            .lock_state()
            .products
            .get(id)
            .map(|cached| cached.cached_at)
    }

    /// Returns the number of cached records.
    pub fn cached_count(&self) -> usize {
        self.inner.lock_state().products.len()
    }

    /// Returns the number of store queries currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.in_flight_count()
    }

    /// Returns a snapshot of the catalog counters.
    pub fn stats(&self) -> CatalogStats {
        self.inner.lock_state().stats.clone()
    }

    /// Returns the store collaborator queries are sent to.
    pub fn store(&self) -> &S {
        &self.inner.store
    }
}

impl<S: ProductStore> Inner<S> {
    fn lock_state(&self) -> MutexGuard<'_, CatalogState<S::Product>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handles the store's answer for `key`; dropped if the supervisor already fired.
    fn finish_query(
        &self,
        key: &IdentifierSet,
        supervisor: &TimeoutSupervisor,
        result: Result<Vec<S::Product>>,
    ) {
        if !supervisor.disarm() {
            debug!(identifiers = %key, "store answered after timeout, discarding");
            return;
        }

        let result = match result {
            Ok(products) => {
                let fetched = self.merge(products);
                debug!(identifiers = %key, fetched = fetched.len(), "store query completed");
                Ok(fetched)
            }
            Err(err) => {
                self.lock_state().stats.failures += 1;
                warn!(identifiers = %key, error = %err, "store query failed");
                Err(err)
            }
        };
        self.in_flight.complete(key, result);
    }

    fn expire_query(&self, key: &IdentifierSet) {
        self.lock_state().stats.timeouts += 1;
        let timeout = self.request_timeout;
        self.in_flight
            .cancel_in_flight(key, FetchError::TimedOut { timeout });
    }

    /// Additive merge: fetched records overwrite their own identifiers only.
    fn merge(&self, products: Vec<S::Product>) -> ProductSet<S::Product> {
        let now = Utc::now();
        let mut state = self.lock_state();
        let mut fetched = ProductSet::new();
        for product in products {
            let id = product.product_identifier().to_string();
            state.products.insert(
                id.clone(),
                CachedProduct {
                    product: product.clone(),
                    cached_at: now,
                },
            );
            fetched.insert(id, product);
        }
        fetched
    }

    /// Builds one waiter's answer: fresh records first, cached records for the rest.
    fn assemble(
        &self,
        requested: &IdentifierSet,
        mut fetched: ProductSet<S::Product>,
    ) -> ProductSet<S::Product> {
        let state = self.lock_state();
        requested
            .iter()
            .filter_map(|id| {
                fetched
                    .remove(id)
                    .or_else(|| state.products.get(id).map(|cached| cached.product.clone()))
                    .map(|product| (id.to_string(), product))
            })
            .collect()
    }
}

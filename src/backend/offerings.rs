//! Offerings API
//!
//! Coalesced backend calls for offerings and web products. Concurrent calls
//! with equal cache keys share one request and receive the same response.

use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::backend::{
    BackendConfiguration, CacheableOperation, GetOfferingsOperation, GetWebProductsOperation,
    OfferingsResponse, RequestDelay, WebProductsResponse,
};
use crate::cache::{
    deliver_later, CacheKey, CacheStatus, CallbackCache, CoalescingStats, IdentifierSet,
};
use crate::error::{FetchError, Result};

/// Backend entry points for offerings and web products.
///
/// Cloning is cheap and yields a handle sharing the same in-flight callbacks.
#[derive(Clone)]
pub struct OfferingsApi {
    offerings_callbacks: CallbackCache<CacheKey, OfferingsResponse>,
    web_products_callbacks: CallbackCache<CacheKey, WebProductsResponse>,
    backend: BackendConfiguration,
}

impl OfferingsApi {
    /// Creates an API with empty callback caches running on `backend`.
    pub fn new(backend: BackendConfiguration) -> Self {
        Self {
            offerings_callbacks: CallbackCache::new(),
            web_products_callbacks: CallbackCache::new(),
            backend,
        }
    }

    // == Get Offerings ==
    /// Fetches offerings for `app_user_id`, joining an identical request already in flight.
    ///
    /// Backgrounded apps send the request after a random jitter delay.
    pub fn get_offerings<F>(&self, app_user_id: &str, is_app_backgrounded: bool, completion: F)
    where
        F: FnOnce(Result<OfferingsResponse>) + Send + 'static,
    {
        let operation = GetOfferingsOperation::new(app_user_id);
        let status = self
            .offerings_callbacks
            .add(operation.cache_key(), completion);

        if status == CacheStatus::FirstCallbackAddedToList {
            if is_app_backgrounded {
                info!(app_user_id, "offerings stale, updating in background");
            } else {
                info!(app_user_id, "offerings stale, updating in foreground");
            }
        }

        self.backend.add_cacheable_operation(
            operation,
            RequestDelay::default_for(is_app_backgrounded),
            &self.offerings_callbacks,
            status,
        );
    }

    /// Async form of [`get_offerings`](Self::get_offerings).
    pub async fn offerings(
        &self,
        app_user_id: &str,
        is_app_backgrounded: bool,
    ) -> Result<OfferingsResponse> {
        let (sender, receiver) = oneshot::channel();
        self.get_offerings(app_user_id, is_app_backgrounded, move |result| {
            sender.send(result).ok();
        });
        receiver
            .await
            .map_err(|_| FetchError::Internal("offerings completion dropped".to_string()))?
    }

    // == Get Web Products ==
    /// Fetches web product details for `product_ids`.
    ///
    /// An empty identifier set never reaches the backend; its empty response
    /// is delivered from a spawned task.
    pub fn get_web_products<I, F>(&self, app_user_id: &str, product_ids: I, completion: F)
    where
        I: IntoIterator,
        I::Item: Into<String>,
        F: FnOnce(Result<WebProductsResponse>) + Send + 'static,
    {
        let product_ids: IdentifierSet = product_ids.into_iter().collect();
        if product_ids.is_empty() {
            debug!(app_user_id, "no web products requested");
            deliver_later(completion, Ok(WebProductsResponse::default()));
            return;
        }

        let operation = GetWebProductsOperation::new(app_user_id, product_ids);
        let status = self
            .web_products_callbacks
            .add(operation.cache_key(), completion);

        self.backend.add_cacheable_operation(
            operation,
            RequestDelay::None,
            &self.web_products_callbacks,
            status,
        );
    }

    /// Async form of [`get_web_products`](Self::get_web_products).
    pub async fn web_products<I>(&self, app_user_id: &str, product_ids: I) -> Result<WebProductsResponse>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let (sender, receiver) = oneshot::channel();
        self.get_web_products(app_user_id, product_ids, move |result| {
            sender.send(result).ok();
        });
        receiver
            .await
            .map_err(|_| FetchError::Internal("web products completion dropped".to_string()))?
    }

    /// Returns the coalescing counters of offerings requests.
    pub fn offerings_stats(&self) -> CoalescingStats {
        self.offerings_callbacks.stats()
    }

    /// Returns the coalescing counters of web products requests.
    pub fn web_products_stats(&self) -> CoalescingStats {
        self.web_products_callbacks.stats()
    }
}

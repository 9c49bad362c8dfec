//! Cacheable Operation Module
//!
//! Operation descriptors and the backend configuration that executes them
//! on behalf of a callback cache.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::backend::{
    BackendRequest, HttpClient, HttpResponse, OfferingsResponse, RequestPath, WebProductsResponse,
};
use crate::cache::{CacheKey, CacheStatus, CallbackCache, CancellationHandle, IdentifierSet};
use crate::config::Config;
use crate::error::{FetchError, Result};

// == Cacheable Operation ==
/// Describes one unit of backend work: its key, its request and how to decode the answer.
pub trait CacheableOperation: Send + Sync + 'static {
    type Response: DeserializeOwned + Clone + Send + 'static;

    /// Key shared by every equivalent request.
    fn cache_key(&self) -> CacheKey;

    fn request(&self) -> BackendRequest;

    /// Rejects non-2xx statuses, then decodes the JSON body.
    fn decode(&self, response: &HttpResponse) -> Result<Self::Response> {
        if !response.is_success() {
            return Err(FetchError::OperationFailed(format!(
                "backend returned status {}",
                response.status
            )));
        }
        Ok(serde_json::from_slice(&response.body)?)
    }
}

// == Get Offerings ==
#[derive(Debug, Clone)]
pub struct GetOfferingsOperation {
    app_user_id: String,
}

impl GetOfferingsOperation {
    pub const KIND: &'static str = "GetOfferingsOperation";

    pub fn new(app_user_id: impl Into<String>) -> Self {
        Self {
            app_user_id: app_user_id.into(),
        }
    }
}

impl CacheableOperation for GetOfferingsOperation {
    type Response = OfferingsResponse;

    fn cache_key(&self) -> CacheKey {
        CacheKey::user_scoped(Self::KIND, &self.app_user_id)
    }

    fn request(&self) -> BackendRequest {
        BackendRequest {
            app_user_id: self.app_user_id.clone(),
            path: RequestPath::GetOfferings,
        }
    }
}

// == Get Web Products ==
#[derive(Debug, Clone)]
pub struct GetWebProductsOperation {
    app_user_id: String,
    product_ids: IdentifierSet,
}

impl GetWebProductsOperation {
    pub const KIND: &'static str = "GetWebProductsOperation";

    pub fn new(app_user_id: impl Into<String>, product_ids: IdentifierSet) -> Self {
        Self {
            app_user_id: app_user_id.into(),
            product_ids,
        }
    }
}

impl CacheableOperation for GetWebProductsOperation {
    type Response = WebProductsResponse;

    fn cache_key(&self) -> CacheKey {
        CacheKey::with_identifiers(Self::KIND, &self.app_user_id, &self.product_ids)
    }

    fn request(&self) -> BackendRequest {
        BackendRequest {
            app_user_id: self.app_user_id.clone(),
            path: RequestPath::GetWebProducts {
                product_ids: self.product_ids.clone(),
            },
        }
    }
}

// == Request Delay ==
/// Random delay applied before a cacheable request is sent.
///
/// Spreads refreshes issued by backgrounded apps so they do not all hit the
/// backend at the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDelay {
    /// Send immediately
    None,
    /// Uniform in `[0, max)`
    Default,
    /// Uniform in `[max, 2 * max)`
    Long,
}

impl RequestDelay {
    /// Backgrounded apps get [`RequestDelay::Default`], foreground requests go out immediately.
    pub fn default_for(is_app_backgrounded: bool) -> Self {
        if is_app_backgrounded {
            RequestDelay::Default
        } else {
            RequestDelay::None
        }
    }

    /// Draws a concrete delay for a jitter upper bound of `max`.
    pub fn jitter(self, max: Duration) -> Duration {
        match self {
            RequestDelay::None => Duration::ZERO,
            RequestDelay::Default => random_below(max),
            RequestDelay::Long => max + random_below(max),
        }
    }
}

fn random_below(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..max_ms))
}

// == Backend Configuration ==
/// Shared transport and jitter settings used to run cacheable operations.
#[derive(Clone)]
pub struct BackendConfiguration {
    http_client: Arc<dyn HttpClient>,
    jitter_max: Duration,
}

impl BackendConfiguration {
    pub fn new(http_client: Arc<dyn HttpClient>, jitter_max: Duration) -> Self {
        Self {
            http_client,
            jitter_max,
        }
    }

    pub fn from_config(http_client: Arc<dyn HttpClient>, config: &Config) -> Self {
        Self::new(http_client, config.background_jitter_max)
    }

    // == Add Cacheable Operation ==
    /// Runs `operation` and routes its outcome into `cache`, unless an
    /// equivalent operation is already in flight.
    ///
    /// # Arguments
    /// * `operation` - Descriptor of the work to run
    /// * `delay` - Jitter applied before the request is sent
    /// * `cache` - Callback cache that owns the waiters for this operation's key
    /// * `status` - Status returned when the caller registered its callback
    pub fn add_cacheable_operation<O: CacheableOperation>(
        &self,
        operation: O,
        delay: RequestDelay,
        cache: &CallbackCache<CacheKey, O::Response>,
        status: CacheStatus,
    ) {
        let key = operation.cache_key();
        if status == CacheStatus::AddedToExistingList {
            debug!(%key, "equivalent operation in flight, not enqueuing");
            return;
        }

        let cancellation = CancellationHandle::new();
        cache.attach_cancellation(&key, cancellation.clone());

        let client = Arc::clone(&self.http_client);
        let cache = cache.clone();
        let perform = move || {
            if cancellation.is_cancelled() {
                return;
            }
            let request = operation.request();
            let handle = client.perform(
                request,
                Box::new(move |response: Result<HttpResponse>| {
                    let result = response.and_then(|response| operation.decode(&response));
                    cache.complete(&key, result);
                }),
            );
            cancellation.link(handle);
        };

        let delay = delay.jitter(self.jitter_max);
        if delay.is_zero() {
            perform();
        } else {
            debug!(delay_ms = delay.as_millis() as u64, "delaying cacheable operation");
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                perform();
            });
        }
    }
}

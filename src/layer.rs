//! Coalescing Layer
//!
//! Wires the backend callbacks and the product catalog to one configuration.

use std::sync::Arc;

use tracing::debug;

use crate::backend::{BackendConfiguration, HttpClient, OfferingsApi, OfferingsResponse};
use crate::catalog::{ProductCatalogCache, ProductSet, ProductStore};
use crate::config::Config;
use crate::error::Result;

/// Shared entry point holding every coalescing cache.
///
/// Cloning is cheap and yields a handle sharing the same caches.
pub struct CoalescingLayer<S: ProductStore> {
    offerings: OfferingsApi,
    catalog: ProductCatalogCache<S>,
}

impl<S: ProductStore> Clone for CoalescingLayer<S> {
    fn clone(&self) -> Self {
        Self {
            offerings: self.offerings.clone(),
            catalog: self.catalog.clone(),
        }
    }
}

impl<S: ProductStore> CoalescingLayer<S> {
    /// Creates a layer from already constructed caches.
    pub fn new(offerings: OfferingsApi, catalog: ProductCatalogCache<S>) -> Self {
        Self { offerings, catalog }
    }

    /// Creates a layer from configuration.
    ///
    /// # Arguments
    /// * `config` - Timeout and jitter settings
    /// * `http_client` - Transport for offerings and web product requests
    /// * `store` - Collaborator for product metadata queries
    pub fn from_config(config: &Config, http_client: Arc<dyn HttpClient>, store: S) -> Self {
        let backend = BackendConfiguration::from_config(http_client, config);
        Self::new(
            OfferingsApi::new(backend),
            ProductCatalogCache::from_config(store, config),
        )
    }

    pub fn offerings(&self) -> &OfferingsApi {
        &self.offerings
    }

    pub fn catalog(&self) -> &ProductCatalogCache<S> {
        &self.catalog
    }

    /// Fetches offerings, then the store products every package refers to.
    pub async fn offerings_and_products(
        &self,
        app_user_id: &str,
        is_app_backgrounded: bool,
    ) -> Result<(OfferingsResponse, ProductSet<S::Product>)> {
        let offerings = self
            .offerings
            .offerings(app_user_id, is_app_backgrounded)
            .await?;
        let identifiers = offerings.product_identifiers();
        debug!(app_user_id, count = identifiers.len(), "fetching offering products");
        let products = self.catalog.fetch(identifiers).await?;
        Ok((offerings, products))
    }
}

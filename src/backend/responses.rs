//! Backend response models
//!
//! Defines the decoded bodies delivered to offerings and web product waiters.

use serde::{Deserialize, Serialize};

use crate::cache::IdentifierSet;

/// Response body for the offerings endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferingsResponse {
    /// Identifier of the offering to show by default
    #[serde(default)]
    pub current_offering_id: Option<String>,
    /// All offerings configured for the app
    pub offerings: Vec<OfferingResponse>,
}

impl OfferingsResponse {
    /// Returns the store identifiers of every package across all offerings.
    pub fn product_identifiers(&self) -> IdentifierSet {
        self.offerings
            .iter()
            .flat_map(|offering| offering.packages.iter())
            .map(|package| package.platform_product_identifier.clone())
            .collect()
    }

    pub fn current_offering(&self) -> Option<&OfferingResponse> {
        let current = self.current_offering_id.as_deref()?;
        self.offerings.iter().find(|o| o.identifier == current)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferingResponse {
    pub identifier: String,
    #[serde(default)]
    pub description: String,
    pub packages: Vec<PackageResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageResponse {
    pub identifier: String,
    pub platform_product_identifier: String,
}

/// Response body for the web products endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebProductsResponse {
    pub products: Vec<WebProductResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebProductResponse {
    pub identifier: String,
    pub product_type: String,
    pub title: String,
    #[serde(default)]
    pub default_purchase_option_id: Option<String>,
}

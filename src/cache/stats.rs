//! Cache Statistics Module
//!
//! Tracks coalescing and catalog metrics: registrations, joins, hits and timeouts.

use serde::Serialize;

// == Coalescing Stats ==
/// Counters kept by a callback cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoalescingStats {
    /// Registrations that created a new in-flight entry
    pub first_registrations: u64,
    /// Registrations that joined an entry already in flight
    pub joined: u64,
    /// In-flight entries resolved (normally or by cancellation)
    pub completions: u64,
    /// Callbacks invoked across all completions
    pub callbacks_delivered: u64,
    /// Completions that arrived for a key with no entry and were dropped
    pub discarded_completions: u64,
}

impl CoalescingStats {
    // == Constructor ==
    /// Creates a new CoalescingStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Coalescing Rate ==
    /// Fraction of registrations that were served by an existing operation.
    ///
    /// Returns joined / (first + joined), or 0.0 if nothing was registered.
    pub fn coalescing_rate(&self) -> f64 {
        let total = self.first_registrations + self.joined;
        if total == 0 {
            0.0
        } else {
            self.joined as f64 / total as f64
        }
    }

    pub(crate) fn record_first_registration(&mut self) {
        self.first_registrations += 1;
    }

    pub(crate) fn record_join(&mut self) {
        self.joined += 1;
    }

    pub(crate) fn record_completion(&mut self, delivered: usize) {
        self.completions += 1;
        self.callbacks_delivered += delivered as u64;
    }

    pub(crate) fn record_discarded(&mut self) {
        self.discarded_completions += 1;
    }
}

// == Catalog Stats ==
/// Counters kept by the product catalog cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    /// Non-empty product requests received
    pub requests: u64,
    /// Requests answered entirely from the store
    pub cache_hits: u64,
    /// Store queries started
    pub queries_started: u64,
    /// Requests that joined a query already in flight
    pub joined: u64,
    /// Queries resolved by the timeout supervisor
    pub timeouts: u64,
    /// Queries that failed in the store
    pub failures: u64,
}

impl CatalogStats {
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the store hit rate.
    ///
    /// Returns cache_hits / requests, or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.requests as f64
        }
    }
}

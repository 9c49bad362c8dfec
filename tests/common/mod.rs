//! Shared test doubles for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use request_coalescer::backend::{BackendRequest, HttpClient, HttpResponse, ResponseHandler};
use request_coalescer::catalog::ProductsCompletion;
use request_coalescer::{CancellationHandle, FetchError, IdentifierSet, ProductStore, StoreProduct};

// == Response Timing ==
/// When a mock collaborator answers.
#[derive(Debug, Clone, Copy)]
pub enum Respond {
    /// Synchronously, inside the request call
    Immediately,
    /// From a spawned task after the given delay
    After(Duration),
    /// Only when the test calls `release_all`
    Manually,
}

// == Mock Product ==
#[derive(Debug, Clone, PartialEq)]
pub struct MockProduct {
    pub id: String,
    pub title: String,
}

impl MockProduct {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            title: format!("Mock {id}"),
        }
    }
}

impl StoreProduct for MockProduct {
    fn product_identifier(&self) -> &str {
        &self.id
    }
}

// == Mock Store ==
/// Product store that records every query and answers with one product per identifier.
pub struct MockStore {
    respond: Respond,
    failure: Mutex<Option<FetchError>>,
    invocations: AtomicUsize,
    parameters: Mutex<Vec<IdentifierSet>>,
    parked: Mutex<Vec<(IdentifierSet, ProductsCompletion<MockProduct>)>>,
    cancel_called: Arc<AtomicBool>,
}

impl MockStore {
    pub fn new(respond: Respond) -> Arc<Self> {
        Arc::new(Self {
            respond,
            failure: Mutex::new(None),
            invocations: AtomicUsize::new(0),
            parameters: Mutex::new(Vec::new()),
            parked: Mutex::new(Vec::new()),
            cancel_called: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Makes every subsequent answer fail with `error`.
    pub fn fail_with(&self, error: FetchError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn parameters(&self) -> Vec<IdentifierSet> {
        self.parameters.lock().unwrap().clone()
    }

    pub fn cancel_called(&self) -> bool {
        self.cancel_called.load(Ordering::SeqCst)
    }

    /// Answers every parked query.
    pub fn release_all(&self) {
        let parked = std::mem::take(&mut *self.parked.lock().unwrap());
        for (identifiers, completion) in parked {
            completion(self.answer(&identifiers));
        }
    }

    fn answer(&self, identifiers: &IdentifierSet) -> request_coalescer::Result<Vec<MockProduct>> {
        match self.failure.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(identifiers.iter().map(MockProduct::new).collect()),
        }
    }
}

impl ProductStore for MockStore {
    type Product = MockProduct;

    fn request_products(
        &self,
        identifiers: &IdentifierSet,
        completion: ProductsCompletion<MockProduct>,
    ) -> CancellationHandle {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.parameters.lock().unwrap().push(identifiers.clone());

        match self.respond {
            Respond::Immediately => completion(self.answer(identifiers)),
            Respond::After(delay) => {
                let answer = self.answer(identifiers);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    completion(answer);
                });
            }
            Respond::Manually => self
                .parked
                .lock()
                .unwrap()
                .push((identifiers.clone(), completion)),
        }

        let handle = CancellationHandle::new();
        let cancel_called = Arc::clone(&self.cancel_called);
        handle.on_cancel(move || cancel_called.store(true, Ordering::SeqCst));
        handle
    }
}

// == Mock HTTP Client ==
/// Transport that records requests and answers with a fixed response.
pub struct MockHttpClient {
    respond: Respond,
    response: Mutex<request_coalescer::Result<HttpResponse>>,
    requests: Mutex<Vec<BackendRequest>>,
    parked: Mutex<Vec<ResponseHandler>>,
    cancel_called: Arc<AtomicBool>,
}

impl MockHttpClient {
    pub fn new(respond: Respond) -> Arc<Self> {
        Arc::new(Self {
            respond,
            response: Mutex::new(Ok(HttpResponse::new(200, offerings_body()))),
            requests: Mutex::new(Vec::new()),
            parked: Mutex::new(Vec::new()),
            cancel_called: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn set_response(&self, response: request_coalescer::Result<HttpResponse>) {
        *self.response.lock().unwrap() = response;
    }

    pub fn requests(&self) -> Vec<BackendRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn cancel_called(&self) -> bool {
        self.cancel_called.load(Ordering::SeqCst)
    }

    pub fn release_all(&self) {
        let parked = std::mem::take(&mut *self.parked.lock().unwrap());
        for completion in parked {
            let response = self.response.lock().unwrap().clone();
            completion(response);
        }
    }
}

impl HttpClient for MockHttpClient {
    fn perform(&self, request: BackendRequest, completion: ResponseHandler) -> CancellationHandle {
        self.requests.lock().unwrap().push(request);

        match self.respond {
            Respond::Immediately => {
                let response = self.response.lock().unwrap().clone();
                completion(response);
            }
            Respond::After(delay) => {
                let response = self.response.lock().unwrap().clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    completion(response);
                });
            }
            Respond::Manually => self.parked.lock().unwrap().push(completion),
        }

        let handle = CancellationHandle::new();
        let cancel_called = Arc::clone(&self.cancel_called);
        handle.on_cancel(move || cancel_called.store(true, Ordering::SeqCst));
        handle
    }
}

// == Helper Functions ==

pub fn ids(values: &[&str]) -> IdentifierSet {
    values.iter().copied().collect()
}

pub fn offerings_body() -> String {
    serde_json::json!({
        "current_offering_id": "default",
        "offerings": [{
            "identifier": "default",
            "description": "Standard set",
            "packages": [
                {"identifier": "$rc_monthly", "platform_product_identifier": "monthly"},
                {"identifier": "$rc_annual", "platform_product_identifier": "annual"}
            ]
        }]
    })
    .to_string()
}

pub fn web_products_body() -> String {
    serde_json::json!({
        "products": [
            {"identifier": "web_monthly", "product_type": "subscription", "title": "Monthly"}
        ]
    })
    .to_string()
}

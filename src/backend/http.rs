//! HTTP Collaborator Module
//!
//! Narrow interface to the transport that performs backend requests.

use crate::cache::{CancellationHandle, IdentifierSet};
use crate::error::Result;

/// Completion handed to the transport for one request.
pub type ResponseHandler = Box<dyn FnOnce(Result<HttpResponse>) + Send>;

// == Request Path ==
/// Backend endpoints reachable through the coalescing layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPath {
    GetOfferings,
    GetWebProducts { product_ids: IdentifierSet },
}

// == Backend Request ==
/// One request as seen by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendRequest {
    /// User the request is made on behalf of
    pub app_user_id: String,
    /// Endpoint and its parameters
    pub path: RequestPath,
}

// == HTTP Response ==
/// Raw transport answer, decoded by the operation that issued the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// == HTTP Client ==
/// Executes backend requests.
///
/// Implementations must invoke `completion` exactly once unless the returned
/// handle is cancelled first, and must tolerate `cancel()` at any time,
/// including after completion.
pub trait HttpClient: Send + Sync + 'static {
    fn perform(&self, request: BackendRequest, completion: ResponseHandler) -> CancellationHandle;
}

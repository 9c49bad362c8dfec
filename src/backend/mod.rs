//! Backend Module
//!
//! Coalesced backend operations: offerings and web products, the transport
//! seam they run on, and the response bodies they decode.

mod http;
mod offerings;
mod operation;
mod responses;

pub use http::{BackendRequest, HttpClient, HttpResponse, RequestPath, ResponseHandler};
pub use offerings::OfferingsApi;
pub use operation::{
    BackendConfiguration, CacheableOperation, GetOfferingsOperation, GetWebProductsOperation,
    RequestDelay,
};
pub use responses::{
    OfferingResponse, OfferingsResponse, PackageResponse, WebProductResponse, WebProductsResponse,
};

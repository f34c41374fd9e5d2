//! Per-request trace identifier.
//!
//! The hosting layer assigns the identifier before any other middleware runs:
//! an inbound `x-request-id` is kept, otherwise a UUID v4 is generated. The
//! same value is echoed on the response.

use std::{convert::Infallible, fmt};

use axum::{async_trait, extract::FromRequestParts};
use http::{request::Parts, HeaderMap, HeaderName, HeaderValue, Request};
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use uuid::Uuid;

pub const TRACE_IDENTIFIER_HEADER: HeaderName = HeaderName::from_static("x-request-id");

const UNKNOWN: &str = "unknown";

/// Opaque correlation string for one request's log lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceIdentifier(String);

impl TraceIdentifier {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn from_request<B>(request: &Request<B>) -> Self {
        request
            .extensions()
            .get::<RequestId>()
            .and_then(|id| id.header_value().to_str().ok())
            .map(Self::new)
            .unwrap_or_else(|| Self::from_headers(request.headers()))
    }

    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(&TRACE_IDENTIFIER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(Self::new)
            .unwrap_or_else(|| Self::new(UNKNOWN))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for TraceIdentifier
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let from_extension = parts
            .extensions
            .get::<RequestId>()
            .and_then(|id| id.header_value().to_str().ok())
            .map(TraceIdentifier::new);

        Ok(from_extension.unwrap_or_else(|| TraceIdentifier::from_headers(&parts.headers)))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MakeTraceIdentifier;

impl MakeRequestId for MakeTraceIdentifier {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

pub fn set_trace_identifier_layer() -> SetRequestIdLayer<MakeTraceIdentifier> {
    SetRequestIdLayer::new(TRACE_IDENTIFIER_HEADER, MakeTraceIdentifier)
}

pub fn propagate_trace_identifier_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(TRACE_IDENTIFIER_HEADER)
}

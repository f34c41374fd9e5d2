use http::Request;
use opentelemetry::{global, propagation::Extractor};
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::middleware::request_id::TraceIdentifier;

/// Constructs a [`opentelemetry::Context`] from [`Request`] headers
/// and assigns it as parent of the returned request [`Span`].
///
/// Without a propagated context the span starts a new trace.
#[track_caller]
pub fn extract_opentelemetry_context_from_request<T>(
    request: &Request<T>,
    trace_identifier: &TraceIdentifier,
) -> Span {
    let context = global::get_text_map_propagator(|extractor| {
        extractor.extract(&RequestExtractor::new(request))
    });

    let span = tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        trace_identifier = %trace_identifier,
    );
    span.set_parent(context);

    span
}

// "uber-trace-id" => https://www.jaegertracing.io/docs/1.21/client-libraries/#propagation-format

/// Extractor used via opentelemetry propagator to read the propagation
/// headers of an incoming request, so a caller's trace continues here.
struct RequestExtractor<'a, T> {
    request: &'a Request<T>,
}

impl<'a, T> RequestExtractor<'a, T> {
    pub fn new(request: &'a Request<T>) -> Self {
        RequestExtractor { request }
    }
}

impl<'a, T> Extractor for RequestExtractor<'a, T> {
    fn get(&self, key: &str) -> Option<&str> {
        self.request
            .headers()
            .get(key)
            .and_then(|h| h.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.request.headers().keys().map(|s| s.as_str()).collect()
    }
}

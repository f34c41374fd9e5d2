use std::{
    future::Future,
    pin::Pin,
    task::{ready, Context, Poll},
    time::{Duration, Instant},
};

use http::{Request, Response, StatusCode};
use pin_project_lite::pin_project;
use tower::Service;
use tower_layer::Layer;
use tracing::{instrument::Instrumented, Instrument};

use crate::{http_injector, middleware::request_id::TraceIdentifier};

/// Logs the start and completion of every request with its trace identifier.
///
/// The request is handed to the inner service unchanged and every response
/// or error comes back unchanged; this layer is not an error boundary. The
/// completion line is written even when the inner future never resolves,
/// e.g. when a handler panics and the future is dropped during unwinding.
///
/// Needs to run inside the layer assigning the trace identifier:
///
/// ```ignore
/// let app = Router::new()
///     .route("/foo", get(|| async {}))
///     .layer(RequestLoggingLayer)
///     .layer(set_trace_identifier_layer());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLoggingLayer;

impl<S> Layer<S> for RequestLoggingLayer {
    type Service = RequestLoggingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        RequestLoggingService { service }
    }
}

/// This service implements the request logging behavior
#[derive(Debug, Clone)]
pub struct RequestLoggingService<S> {
    service: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestLoggingService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Error = S::Error;
    type Future = Instrumented<ResponseFuture<S::Future>>;
    type Response = S::Response;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let trace_identifier = TraceIdentifier::from_request(&request);
        let span =
            http_injector::extract_opentelemetry_context_from_request(&request, &trace_identifier);

        let inner = span.in_scope(|| {
            tracing::debug!(
                trace_identifier = %trace_identifier,
                method = %request.method(),
                path = %request.uri().path(),
                "Request started"
            );
            self.service.call(request)
        });

        ResponseFuture {
            inner,
            completion: Completion::new(trace_identifier),
        }
        .instrument(span)
    }
}

pin_project! {
    /// Response future of [`RequestLoggingService`].
    pub struct ResponseFuture<F> {
        #[pin]
        inner: F,
        completion: Completion,
    }
}

impl<F, ResBody, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let result = ready!(this.inner.poll(cx));

        let status = result.as_ref().ok().map(Response::status);
        this.completion.finish(status);

        Poll::Ready(result)
    }
}

struct Completion {
    trace_identifier: TraceIdentifier,
    started: Instant,
    logged: bool,
}

impl Completion {
    fn new(trace_identifier: TraceIdentifier) -> Self {
        Self {
            trace_identifier,
            started: Instant::now(),
            logged: false,
        }
    }

    fn finish(&mut self, status: Option<StatusCode>) {
        self.logged = true;
        let elapsed_ms = millis(self.started.elapsed());

        match status {
            Some(status) => tracing::debug!(
                trace_identifier = %self.trace_identifier,
                status = status.as_u16(),
                elapsed_ms,
                "Request finished"
            ),
            None => tracing::debug!(
                trace_identifier = %self.trace_identifier,
                elapsed_ms,
                "Request failed"
            ),
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.logged {
            tracing::debug!(
                trace_identifier = %self.trace_identifier,
                elapsed_ms = millis(self.started.elapsed()),
                "Request aborted"
            );
        }
    }
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

//! `/log/*` handlers: one per severity plus one that fails on purpose.

use axum::{http::StatusCode, routing::get, Router};

use crate::{middleware::TraceIdentifier, trace_id::CRITICAL};

pub const THROW_MESSAGE: &str = "I'm throwing!";

pub fn router() -> Router {
    let log = Router::new()
        .route("/trace", get(trace))
        .route("/debug", get(debug))
        .route("/information", get(information))
        .route("/warning", get(warning))
        .route("/error", get(error))
        .route("/critical", get(critical))
        .route("/throw", get(throw));

    Router::new().nest("/log", log)
}

async fn trace(trace_identifier: TraceIdentifier) -> StatusCode {
    tracing::trace!(%trace_identifier, "I'm a trace {trace_identifier}");
    StatusCode::ACCEPTED
}

async fn debug(trace_identifier: TraceIdentifier) -> StatusCode {
    tracing::debug!(%trace_identifier, "I'm a debug {trace_identifier}");
    StatusCode::ACCEPTED
}

async fn information(trace_identifier: TraceIdentifier) -> StatusCode {
    tracing::info!(%trace_identifier, "I'm an information {trace_identifier}");
    StatusCode::ACCEPTED
}

async fn warning(trace_identifier: TraceIdentifier) -> StatusCode {
    tracing::warn!(%trace_identifier, "I'm a warning {trace_identifier}");
    StatusCode::ACCEPTED
}

async fn error(trace_identifier: TraceIdentifier) -> StatusCode {
    tracing::error!(%trace_identifier, "I'm an error {trace_identifier}");
    StatusCode::ACCEPTED
}

async fn critical(trace_identifier: TraceIdentifier) -> StatusCode {
    tracing::error!(%trace_identifier, severity = CRITICAL, "I'm a critical {trace_identifier}");
    StatusCode::ACCEPTED
}

async fn throw() -> StatusCode {
    panic!("{THROW_MESSAGE}")
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::Request;
    use tower::ServiceExt;
    use tracing::Level;

    use super::*;
    use crate::{middleware::TRACE_IDENTIFIER_HEADER, testing::LogCapture};

    fn get_request(path: &str) -> Request<Body> {
        Request::builder()
            .uri(path)
            .header(TRACE_IDENTIFIER_HEADER, "0HLTEST:00000001")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn severity_endpoints_log_once_and_accept() {
        let cases = [
            ("/log/trace", Level::TRACE, "I'm a trace 0HLTEST:00000001"),
            ("/log/debug", Level::DEBUG, "I'm a debug 0HLTEST:00000001"),
            ("/log/information", Level::INFO, "I'm an information 0HLTEST:00000001"),
            ("/log/warning", Level::WARN, "I'm a warning 0HLTEST:00000001"),
            ("/log/error", Level::ERROR, "I'm an error 0HLTEST:00000001"),
            ("/log/critical", Level::ERROR, "I'm a critical 0HLTEST:00000001"),
        ];

        for (path, level, message) in cases {
            let capture = LogCapture::new();
            let _guard = capture.set_default();

            let response = router().oneshot(get_request(path)).await.unwrap();

            assert_eq!(response.status(), StatusCode::ACCEPTED, "{path}");
            let events = capture.events();
            assert_eq!(events.len(), 1, "{path}");
            assert_eq!(events[0].level, level, "{path}");
            assert_eq!(events[0].message, message, "{path}");
            assert_eq!(
                events[0].field("trace_identifier").as_deref(),
                Some("0HLTEST:00000001"),
                "{path}"
            );
        }
    }

    #[tokio::test]
    async fn critical_is_tagged() {
        let capture = LogCapture::new();
        let _guard = capture.set_default();

        router().oneshot(get_request("/log/critical")).await.unwrap();

        assert_eq!(capture.events()[0].field("severity").as_deref(), Some(CRITICAL));
    }

    #[tokio::test]
    #[should_panic(expected = "I'm throwing!")]
    async fn throw_raises_unhandled_error() {
        let _ = router().oneshot(get_request("/log/throw")).await;
    }

    #[tokio::test]
    async fn unknown_severity_is_not_found() {
        let response = router().oneshot(get_request("/log/verbose")).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

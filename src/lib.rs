//! # Request telemetry
//! Two small services showing how request logging and cloud telemetry are
//! layered onto an HTTP API. Both expose `/log/{severity}` endpoints and a
//! `/log/throw` endpoint that fails on purpose.
//!
//! ## Setup
//! Telemetry is configured from the `ApplicationInsights` configuration
//! section. [`options::TelemetryPlan::resolve`] decides which defaults are
//! overridden, [`setup::TelemetryBuilder`] installs tracing, metrics and logs
//! via the otlp exporter. This should happen before the server accepts
//! traffic, [`server::run`] takes care of the order.
//!
//! ## Request logging
//! [`middleware::RequestLoggingLayer`] logs the start and completion of every
//! request with its trace identifier, assigned by
//! [`middleware::set_trace_identifier_layer`]. Incoming trace context headers
//! are extracted via [`http_injector`], correlating traces across services.
//!
//! Every telemetry record is stamped with the emitting service's role name,
//! see [`role`].

pub mod channel;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod http_injector;
pub mod middleware;
pub mod options;
pub mod role;
pub mod server;
pub mod setup;
pub mod trace_id;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use role::ServiceRole;

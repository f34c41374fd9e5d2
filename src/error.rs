use std::{io, path::PathBuf};

use opentelemetry::{logs::LogError, metrics::MetricsError, trace::TraceError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("trace pipeline error: {0}")]
    Trace(#[from] TraceError),

    #[error("metrics pipeline error: {0}")]
    Metrics(#[from] MetricsError),

    #[error("log pipeline error: {0}")]
    Logs(#[from] LogError),

    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),

    #[error("failed to open telemetry storage folder {path:?}: {source}")]
    Storage { path: PathBuf, source: io::Error },

    #[error("invalid listen address {0:?}")]
    Address(String),

    #[error("server error: {0}")]
    Server(#[from] io::Error),
}

//! Configurable telemetry options.
//!
//! [`TelemetryPlan::resolve`] reads the `ApplicationInsights` section and
//! decides which defaults get overridden. It is a pure function of the
//! configuration and the host OS so it can be tested without installing any
//! exporter.

use std::path::PathBuf;

use crate::{channel::TelemetryChannel, config::Configuration};

pub const APPLICATION_VERSION: &str = "ApplicationInsights:ApplicationVersion";
pub const ENABLE_ADAPTIVE_SAMPLING: &str = "ApplicationInsights:EnableAdaptiveSampling";
pub const INSTRUMENTATION_KEY: &str = "ApplicationInsights:InstrumentationKey";
pub const DEVELOPER_MODE: &str = "ApplicationInsights:TelemetryChannel:DeveloperMode";
pub const STORAGE_FOLDER: &str = "ApplicationInsights:TelemetryChannel:StorageFolder";
pub const ENDPOINT: &str = "ApplicationInsights:Endpoint";
/// Standard OpenTelemetry variable, wins over [`ENDPOINT`].
pub const OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

pub const DEFAULT_ENDPOINT: &str = "http://localhost:4317";

/// Options applied to the telemetry pipelines when they are installed.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryOptions {
    pub application_version: String,
    pub enable_adaptive_sampling: bool,
    pub instrumentation_key: Option<String>,
    pub developer_mode: Option<bool>,
    pub endpoint: String,
}

impl Default for TelemetryOptions {
    fn default() -> Self {
        Self {
            application_version: env!("CARGO_PKG_VERSION").to_string(),
            enable_adaptive_sampling: true,
            instrumentation_key: None,
            developer_mode: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

impl TelemetryOptions {
    /// Developer mode sends every record immediately instead of batching.
    pub fn exports_immediately(&self) -> bool {
        self.developer_mode.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    Windows,
    Other,
}

impl HostOs {
    pub fn current() -> Self {
        if cfg!(windows) {
            HostOs::Windows
        } else {
            HostOs::Other
        }
    }
}

/// Resolved options plus the custom channel to register ahead of the
/// generic telemetry setup, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryPlan {
    pub options: TelemetryOptions,
    pub channel: Option<TelemetryChannel>,
}

impl TelemetryPlan {
    pub fn resolve(configuration: &Configuration, host: HostOs) -> Self {
        let mut options = TelemetryOptions::default();

        if let Some(version) = configuration.get_non_blank(APPLICATION_VERSION) {
            options.application_version = version;
        }

        if let Some(enabled) = configuration
            .get(ENABLE_ADAPTIVE_SAMPLING)
            .as_deref()
            .and_then(parse_bool)
        {
            options.enable_adaptive_sampling = enabled;
        }

        if let Some(key) = configuration.get_non_blank(INSTRUMENTATION_KEY) {
            options.instrumentation_key = Some(key);
        }

        if let Some(developer_mode) = configuration
            .get(DEVELOPER_MODE)
            .as_deref()
            .and_then(parse_bool)
        {
            options.developer_mode = Some(developer_mode);
        }

        if let Some(endpoint) = configuration
            .get_non_blank(OTLP_ENDPOINT)
            .or_else(|| configuration.get_non_blank(ENDPOINT))
        {
            options.endpoint = endpoint;
        }

        // The channel spools to a plain directory, which is only supported off Windows.
        let channel = match (host, configuration.get_non_blank(STORAGE_FOLDER)) {
            (HostOs::Other, Some(folder)) => {
                Some(TelemetryChannel::with_storage_folder(PathBuf::from(folder)))
            }
            _ => None,
        };

        TelemetryPlan { options, channel }
    }
}

/// Parses `true`/`false` ignoring case and surrounding whitespace.
pub fn parse_bool(value: &str) -> Option<bool> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

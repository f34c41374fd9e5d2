use std::{sync::Mutex, time::Duration};

use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    logs::Config,
    metrics::SdkMeterProvider,
    runtime,
    trace::{Sampler, Tracer},
    Resource,
};
use opentelemetry_semantic_conventions::resource::SERVICE_VERSION;
use tracing_core::{LevelFilter, Subscriber};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt, EnvFilter, Layer,
    Registry,
};

use crate::{
    channel::TelemetryChannel,
    error::Result,
    options::TelemetryOptions,
    role::{RoleNameInitializer, ServiceRole, TelemetryInitializer},
    trace_id::OpenTelemetryTracingBridge,
};

/// Resource attribute carrying the configured instrumentation key.
pub const INSTRUMENTATION_KEY_ATTRIBUTE: &str = "ai.instrumentation_key";
/// Share of new traces kept while adaptive sampling is on. Sampled parents
/// are always followed.
pub const ADAPTIVE_SAMPLING_RATIO: f64 = 0.5;

const DEVELOPER_METRICS_PERIOD: Duration = Duration::from_secs(1);

/// Collects everything telemetry needs before it is installed.
///
/// A channel registered with [`TelemetryBuilder::with_channel`] must be
/// registered before [`TelemetryBuilder::add_telemetry`]; the generic setup
/// only fills in the default channel when none is present.
pub struct TelemetryBuilder {
    role: ServiceRole,
    initializers: Vec<Box<dyn TelemetryInitializer>>,
    channel: Option<TelemetryChannel>,
    options: Option<TelemetryOptions>,
    log_level: String,
}

impl TelemetryBuilder {
    pub fn new(role: ServiceRole) -> Self {
        Self {
            role,
            initializers: vec![Box::new(RoleNameInitializer::new(role))],
            channel: None,
            options: None,
            log_level: "info".to_string(),
        }
    }

    pub fn with_initializer(mut self, initializer: impl TelemetryInitializer + 'static) -> Self {
        self.initializers.push(Box::new(initializer));
        self
    }

    pub fn with_channel(mut self, channel: TelemetryChannel) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Default filter directive, used unless `RUST_LOG` is set.
    pub fn with_log_level(mut self, log_level: impl Into<String>) -> Self {
        self.log_level = log_level.into();
        self
    }

    pub fn add_telemetry(mut self, options: TelemetryOptions) -> Self {
        self.channel.get_or_insert_with(TelemetryChannel::default);
        self.options = Some(options);
        self
    }

    pub fn channel(&self) -> Option<&TelemetryChannel> {
        self.channel.as_ref()
    }

    pub fn options(&self) -> Option<&TelemetryOptions> {
        self.options.as_ref()
    }

    pub fn resource_attributes(&self, options: &TelemetryOptions) -> Vec<KeyValue> {
        let mut attributes = vec![KeyValue::new(
            SERVICE_VERSION,
            options.application_version.clone(),
        )];
        if let Some(key) = &options.instrumentation_key {
            attributes.push(KeyValue::new(INSTRUMENTATION_KEY_ATTRIBUTE, key.clone()));
        }

        for initializer in &self.initializers {
            initializer.initialize(&mut attributes);
        }

        attributes
    }

    /// Sets up tracing, metrics and logging via otlp exporter and installs
    /// the global `tracing` subscriber.
    ///
    /// Must be called from within a tokio runtime.
    pub fn install(self) -> Result<TelemetryGuard> {
        let options = self.options.clone().unwrap_or_default();
        let channel = self.channel.clone().unwrap_or_default();
        let resource = Resource::new(self.resource_attributes(&options));

        global::set_text_map_propagator(opentelemetry_jaeger_propagator::Propagator::new());

        let meter_provider = init_metrics(&options, resource.clone())?;
        // needs to run before init_tracer
        init_logs(&options, resource.clone())?;
        let tracer = init_tracer(&options, resource)?;

        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.log_level))
            .unwrap_or_else(|_| {
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::INFO.into())
                    .parse_lossy("")
            });

        Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .with(OpenTelemetryTracingBridge::new(&global::logger_provider()))
            .with(spool_layer(&channel, self.role)?)
            .try_init()?;

        tracing::info!(
            role = self.role.role_name(),
            application_version = %options.application_version,
            endpoint = %options.endpoint,
            adaptive_sampling = options.enable_adaptive_sampling,
            developer_mode = options.exports_immediately(),
            storage_folder = ?channel.storage_folder(),
            "telemetry installed"
        );

        Ok(TelemetryGuard { meter_provider })
    }
}

/// Flushes and shuts down the installed providers.
#[must_use = "dropping the guard without calling shutdown loses buffered telemetry"]
pub struct TelemetryGuard {
    meter_provider: SdkMeterProvider,
}

impl TelemetryGuard {
    pub fn shutdown(self) {
        if let Err(error) = self.meter_provider.shutdown() {
            tracing::warn!(%error, "failed to shut down meter provider");
        }
        teardown();
    }
}

/// JSON lines layer appending every event to the channel's spool file, if
/// the channel has a storage folder.
pub fn spool_layer<S>(
    channel: &TelemetryChannel,
    role: ServiceRole,
) -> Result<Option<impl Layer<S>>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    Ok(channel.open_spool(role)?.map(|file| {
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    }))
}

pub fn sampler(options: &TelemetryOptions) -> Sampler {
    if options.enable_adaptive_sampling {
        Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(ADAPTIVE_SAMPLING_RATIO)))
    } else {
        Sampler::AlwaysOn
    }
}

fn init_tracer(options: &TelemetryOptions, resource: Resource) -> Result<Tracer> {
    let pipeline = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(options.endpoint.clone()),
        )
        .with_trace_config(
            opentelemetry_sdk::trace::config()
                .with_resource(resource)
                .with_sampler(sampler(options)),
        );

    let tracer = if options.exports_immediately() {
        pipeline.install_simple()?
    } else {
        pipeline.install_batch(runtime::Tokio)?
    };

    Ok(tracer)
}

fn init_metrics(options: &TelemetryOptions, resource: Resource) -> Result<SdkMeterProvider> {
    let mut pipeline = opentelemetry_otlp::new_pipeline()
        .metrics(runtime::Tokio)
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(options.endpoint.clone()),
        )
        .with_resource(resource);
    if options.exports_immediately() {
        pipeline = pipeline.with_period(DEVELOPER_METRICS_PERIOD);
    }

    let provider = pipeline.build()?;
    global::set_meter_provider(provider.clone());

    Ok(provider)
}

fn init_logs(options: &TelemetryOptions, resource: Resource) -> Result<()> {
    let pipeline = opentelemetry_otlp::new_pipeline()
        .logging()
        .with_log_config(Config::default().with_resource(resource))
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(options.endpoint.clone()),
        );

    if options.exports_immediately() {
        pipeline.install_simple()?;
    } else {
        pipeline.install_batch(runtime::Tokio)?;
    }

    Ok(())
}

pub fn teardown() {
    global::shutdown_logger_provider();
    global::shutdown_tracer_provider();
}

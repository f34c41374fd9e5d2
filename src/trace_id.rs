//! Bridges [`tracing`] events into OpenTelemetry log records.
//!
//! Each record carries the trace and span id of the OpenTelemetry span the
//! event was emitted in, so logs line up with the request trace downstream.

use std::{borrow::Cow, fmt, time::SystemTime};

use opentelemetry::{
    logs::{AnyValue, LogRecord, Logger, LoggerProvider, Severity, TraceContext},
    trace::{SpanContext, SpanId, TraceContextExt, TraceId, TraceState},
    Key,
};
use tracing::{
    field::{Field, Visit},
    Event, Level, Subscriber,
};
use tracing_opentelemetry::OtelData;
use tracing_subscriber::{layer::Context, registry::LookupSpan, Layer};

/// Event field that upgrades an error event to critical severity.
pub const SEVERITY_FIELD: &str = "severity";
pub const CRITICAL: &str = "critical";

pub struct OpenTelemetryTracingBridge<L> {
    logger: L,
}

impl<L> OpenTelemetryTracingBridge<L>
where
    L: Logger + Send + Sync + 'static,
{
    pub fn new<P>(provider: &P) -> Self
    where
        P: LoggerProvider<Logger = L>,
    {
        Self::from_logger(provider.logger(env!("CARGO_PKG_NAME")))
    }

    pub fn from_logger(logger: L) -> Self {
        Self { logger }
    }
}

impl<S, L> Layer<S> for OpenTelemetryTracingBridge<L>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    L: Logger + Send + Sync + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let level = event.metadata().level();
        let (severity, severity_text) = if visitor.critical {
            (Severity::Fatal, "CRITICAL")
        } else {
            (severity_of_level(level), level.as_str())
        };

        let now = SystemTime::now();
        let mut record = LogRecord::default();
        record.timestamp = Some(now);
        record.observed_timestamp = now;
        record.severity_number = Some(severity);
        record.severity_text = Some(Cow::Borrowed(severity_text));
        record.body = visitor.body;

        let mut attributes = visitor.attributes;
        attributes.push((
            Key::from_static_str("target"),
            AnyValue::from(event.metadata().target().to_string()),
        ));
        record.attributes = Some(attributes);

        if let Some(span) = ctx.event_span(event) {
            let extensions = span.extensions();
            if let Some(otel) = extensions.get::<OtelData>() {
                record.trace_context = trace_context(otel);
            }
        }

        self.logger.emit(record);
    }
}

fn trace_context(otel: &OtelData) -> Option<TraceContext> {
    let parent = otel.parent_cx.span();
    let parent = parent.span_context();

    let trace_id = otel
        .builder
        .trace_id
        .or_else(|| parent.is_valid().then(|| parent.trace_id()))?;
    let span_id = otel.builder.span_id.unwrap_or(SpanId::INVALID);

    if trace_id == TraceId::INVALID {
        return None;
    }

    let span_context = SpanContext::new(
        trace_id,
        span_id,
        parent.trace_flags(),
        false,
        TraceState::default(),
    );
    Some(TraceContext::from(&span_context))
}

fn severity_of_level(level: &Level) -> Severity {
    match *level {
        Level::TRACE => Severity::Trace,
        Level::DEBUG => Severity::Debug,
        Level::INFO => Severity::Info,
        Level::WARN => Severity::Warn,
        Level::ERROR => Severity::Error,
    }
}

#[derive(Default)]
struct EventVisitor {
    body: Option<AnyValue>,
    attributes: Vec<(Key, AnyValue)>,
    critical: bool,
}

impl EventVisitor {
    fn push(&mut self, field: &Field, value: AnyValue) {
        self.attributes.push((Key::from_static_str(field.name()), value));
    }
}

impl Visit for EventVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let value = format!("{value:?}");
        if field.name() == "message" {
            self.body = Some(value.into());
        } else {
            self.push(field, value.into());
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.body = Some(value.to_string().into());
            return;
        }
        if field.name() == SEVERITY_FIELD && value.eq_ignore_ascii_case(CRITICAL) {
            self.critical = true;
        }
        self.push(field, value.to_string().into());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        match i64::try_from(value) {
            Ok(value) => self.push(field, value.into()),
            Err(_) => self.push(field, value.to_string().into()),
        }
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, value.into());
    }
}

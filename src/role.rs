//! Cloud role stamping.
//!
//! The stamped attributes become the OpenTelemetry resource, which is
//! attached to every span, metric point and log record the service emits.

use opentelemetry::{Key, KeyValue};
use opentelemetry_semantic_conventions::resource::SERVICE_NAME;

/// Attribute read by Application Insights compatible backends.
pub const CLOUD_ROLE: &str = "cloud.role";

/// Which of the two services is emitting telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceRole {
    LoggingWeb,
    LoggingDownstream,
}

impl ServiceRole {
    pub const fn role_name(self) -> &'static str {
        match self {
            ServiceRole::LoggingWeb => "LoggingWeb",
            ServiceRole::LoggingDownstream => "LoggingDownstream",
        }
    }
}

/// Runs once per telemetry resource before anything is exported.
pub trait TelemetryInitializer: Send + Sync {
    fn initialize(&self, attributes: &mut Vec<KeyValue>);
}

#[derive(Debug, Clone, Copy)]
pub struct RoleNameInitializer {
    role: ServiceRole,
}

impl RoleNameInitializer {
    pub const fn new(role: ServiceRole) -> Self {
        Self { role }
    }
}

impl TelemetryInitializer for RoleNameInitializer {
    fn initialize(&self, attributes: &mut Vec<KeyValue>) {
        let name = self.role.role_name();
        stamp(attributes, Key::from_static_str(SERVICE_NAME), name);
        stamp(attributes, Key::from_static_str(CLOUD_ROLE), name);
    }
}

fn stamp(attributes: &mut Vec<KeyValue>, key: Key, value: &'static str) {
    attributes.retain(|attribute| attribute.key != key);
    attributes.push(KeyValue::new(key, value));
}

//! Hierarchical key/value configuration.
//!
//! Keys are `:` separated sections (`ApplicationInsights:InstrumentationKey`)
//! and compared case-insensitively. Sources are layered with the `config`
//! crate, later ones override earlier ones:
//!
//! 1. a TOML settings file, if present
//! 2. a `.env` file, if present, loaded into the process environment
//! 3. process environment variables, `__` separates sections

use std::{
    env,
    ffi::OsString,
    path::{Path, PathBuf},
};

use config::{
    builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File, FileFormat, Map,
    Source, Value, ValueKind,
};

use crate::error::Result;

/// Environment variable naming an alternative settings file.
pub const SETTINGS_PATH_VAR: &str = "APP_SETTINGS";
/// Settings file read when [`SETTINGS_PATH_VAR`] is unset.
pub const DEFAULT_SETTINGS_FILE: &str = "appsettings.toml";

pub const SERVER_ADDRESS: &str = "Server:Address";
pub const ENVIRONMENT: &str = "Environment";
pub const ENVIRONMENT_FALLBACK: &str = "APP_ENVIRONMENT";
pub const LOG_LEVEL: &str = "Logging:LogLevel:Default";
pub const DOWNSTREAM_BASE_ADDRESS: &str = "Downstream:BaseAddress";

const DEFAULT_ENVIRONMENT: &str = "Production";
const DEFAULT_LOG_LEVEL: &str = "info";
const ENVIRONMENT_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Default)]
pub struct Configuration {
    inner: Config,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the settings file, `.env` and the process environment.
    ///
    /// A missing settings file is not an error, an unreadable or malformed
    /// one is. Environment variables that are not valid unicode are skipped.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = env::var_os(SETTINGS_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));

        Self::from_builder(
            Config::builder()
                .add_source(settings_file(&path))
                .add_source(environment_variables(env::vars_os())),
        )
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        Ok(Self {
            inner: builder.build()?,
        })
    }

    /// Builds an in-memory configuration, mostly useful in tests.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut builder = Config::builder();
        for (key, value) in pairs {
            builder = builder.set_override(path(key.as_ref()), value.into())?;
        }
        Self::from_builder(builder)
    }

    /// Scalar value at `key`, rendered as a string. Sections are not values.
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get_string(&path(key)).ok()
    }

    /// Like [`Configuration::get`], whitespace-only values count as absent.
    pub fn get_non_blank(&self, key: &str) -> Option<String> {
        self.get(key).filter(|value| !value.trim().is_empty())
    }

    /// Hosting environment name, `Production` unless configured.
    pub fn environment(&self) -> String {
        self.get_non_blank(ENVIRONMENT)
            .or_else(|| self.get_non_blank(ENVIRONMENT_FALLBACK))
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string())
    }

    pub fn is_development(&self) -> bool {
        self.environment().eq_ignore_ascii_case("development")
    }

    pub fn log_level(&self) -> String {
        self.get_non_blank(LOG_LEVEL)
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
    }
}

/// Optional TOML settings file.
pub fn settings_file(path: &Path) -> impl Source + Send + Sync + 'static {
    CaseInsensitive(File::from(path).format(FileFormat::Toml).required(false))
}

/// TOML settings held in memory.
pub fn settings_str(content: &str) -> impl Source + Send + Sync + 'static {
    CaseInsensitive(File::from_str(content, FileFormat::Toml))
}

/// Environment variables as a source, `__` separating sections.
///
/// Entries whose name or value is not valid unicode are dropped.
pub fn environment_variables<I>(vars: I) -> impl Source + Send + Sync + 'static
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let vars: Map<String, String> = vars
        .into_iter()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect();

    CaseInsensitive(
        Environment::default()
            .separator(ENVIRONMENT_SEPARATOR)
            .source(Some(vars)),
    )
}

fn path(key: &str) -> String {
    key.to_ascii_lowercase().replace(':', ".")
}

/// Lowercases every key a source yields, so sections from different sources
/// merge regardless of how they were spelled.
#[derive(Debug, Clone)]
struct CaseInsensitive<S>(S);

impl<S> Source for CaseInsensitive<S>
where
    S: Source + Clone + Send + Sync + 'static,
{
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> std::result::Result<Map<String, Value>, ConfigError> {
        Ok(lowercase_table(self.0.collect()?))
    }
}

fn lowercase_table(table: Map<String, Value>) -> Map<String, Value> {
    table
        .into_iter()
        .map(|(key, value)| (key.to_lowercase(), lowercase_value(value)))
        .collect()
}

fn lowercase_value(value: Value) -> Value {
    match value.kind {
        ValueKind::Table(table) => Value::new(None, ValueKind::Table(lowercase_table(table))),
        ValueKind::Array(items) => Value::new(
            None,
            ValueKind::Array(items.into_iter().map(lowercase_value).collect()),
        ),
        _ => value,
    }
}

//! Typed well-known configuration sections.
//!
//! Every section deserializes from the merged tree through the weakly typed
//! decoder in [`crate::de`], so `"true"`, `"8"` and `"30s"` are accepted
//! wherever a bool, number or duration is expected.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Default path of the application identity section.
pub const APP_SECTION: &str = "app";
/// Default path of the logger section.
pub const LOGGER_SECTION: &str = "logger";
/// Default path of the registries section.
pub const REGISTRIES_SECTION: &str = "registries";
/// Default path of the middlewares section.
pub const MIDDLEWARES_SECTION: &str = "middlewares";
/// Default path of the storage section.
pub const STORAGE_SECTION: &str = "storage";
/// Default path of the generic components section.
pub const COMPONENTS_SECTION: &str = "components";

/// Type tag that disables a discovery entry.
pub const NONE_TYPE: &str = "none";

/// The `app` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppInfoConfig {
    /// Instance identifier
    pub id: String,
    /// Application name
    pub name: String,
    /// Application version
    pub version: String,
    /// Deployment environment
    pub env: String,
    /// Free-form labels
    pub metadata: BTreeMap<String, String>,
}

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Debug and above
    Debug,
    /// Info and above
    #[default]
    Info,
    /// Warnings and errors
    #[serde(alias = "warning")]
    Warn,
    /// Errors only
    Error,
}

impl LogLevel {
    /// Lowercase name, also usable as a filter directive.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Equivalent `tracing` level.
    pub fn as_tracing(&self) -> tracing::Level {
        match self {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

/// Log line encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// The optional log file sink.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogFileConfig {
    /// File path; empty disables the sink
    pub path: String,
    /// Rotation size in megabytes
    pub max_size: u64,
    /// Days to keep rotated files
    pub max_age: u64,
    /// Number of rotated files to keep
    pub max_backups: u64,
    /// Use local time in rotated file names
    pub local_time: bool,
    /// Compress rotated files
    pub compress: bool,
}

/// The `logger` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Minimum level emitted
    pub level: LogLevel,
    /// Line encoding
    pub format: LogFormat,
    /// Write to standard output
    pub stdout: bool,
    /// Optional file sink
    pub file: Option<LogFileConfig>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Text,
            stdout: true,
            file: None,
        }
    }
}

/// One entry of `registries.discoveries`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Backend tag; empty or `none` disables the entry
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Backend-specific fields
    #[serde(flatten)]
    pub options: BTreeMap<String, Value>,
}

impl DiscoveryConfig {
    /// True if the entry names a backend to build.
    pub fn is_enabled(&self) -> bool {
        !self.kind.is_empty() && self.kind != NONE_TYPE
    }
}

/// The `registries` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistriesConfig {
    /// Name of the default registrar; empty means none
    pub default: String,
    /// Discovery backends by name
    pub discoveries: BTreeMap<String, DiscoveryConfig>,
}

/// One entry of `middlewares.middlewares`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    /// Middleware type tag, also the container key
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Disabled entries are skipped
    #[serde(default)]
    pub enabled: bool,
    /// Type-specific fields
    #[serde(flatten)]
    pub options: BTreeMap<String, Value>,
}

/// The `middlewares` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiddlewaresConfig {
    /// Middleware entries in declaration order
    pub middlewares: Vec<MiddlewareConfig>,
}

impl MiddlewaresConfig {
    /// Entries with `enabled: true` and a type tag.
    pub fn enabled(&self) -> impl Iterator<Item = &MiddlewareConfig> {
        self.middlewares
            .iter()
            .filter(|mw| mw.enabled && !mw.kind.is_empty())
    }
}

/// The `storage` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage factory tag; empty selects `default`
    #[serde(rename = "type")]
    pub kind: String,
    /// Name of the default file store
    pub default_filestore: String,
    /// Name of the default cache
    pub default_cache: String,
    /// Name of the default database
    pub default_database: String,
    /// File stores by name
    pub filestores: BTreeMap<String, Value>,
    /// Caches by name
    pub caches: BTreeMap<String, Value>,
    /// Databases by name
    pub databases: BTreeMap<String, Value>,
}

/// One entry of the `components` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// Component type tag
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Opaque fields
    #[serde(flatten)]
    pub options: BTreeMap<String, Value>,
}

//! Error types for Bootstrata.

use std::fmt;

use thiserror::Error;

/// Boxed error used at collaborator seams (transformers, release hooks).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Flat, caller-addressable classification of every error the crate raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed bootstrap file or source entry
    ConfigInvalid,
    /// A source's load failed
    SourceLoadError,
    /// A value cannot be coerced to the requested type
    DecodeMismatch,
    /// Path absent in the loaded view
    KeyNotFound,
    /// Interior non-map encountered during a path walk
    PathNotMap,
    /// Fast-path section accessor declines
    NotImplemented,
    /// Decode target slot is missing
    InvalidTarget,
    /// Source cannot watch for changes
    WatchUnsupported,
    /// id/name/version still empty after merge
    MissingAppInfo,
    /// Named default registrar not found in the built set
    DefaultRegistrarMissing,
    /// Component/source type tag unregistered
    FactoryNotFound,
    /// Duplicate registration of a type tag
    DuplicateFactory,
    /// Caller-supplied configuration transformer failed
    TransformFailed,
    /// A collaborator failed to build a component
    ComponentFailed,
    /// Underlying I/O failure
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Errors raised by sources, the pipeline and the config decoder.
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    /// Malformed bootstrap document or source entry
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// A source failed to produce its records
    #[error("source '{source_name}' failed to load: {reason}")]
    SourceLoad {
        /// Name of the failing source
        source_name: String,
        /// Human readable cause
        reason: String,
    },

    /// A value could not be coerced into the requested type
    #[error("cannot decode '{path}' (found {kind}): {message}")]
    DecodeMismatch {
        /// Dot-separated path of the offending leaf
        path: String,
        /// Concrete kind of the offending leaf
        kind: String,
        /// Decoder message
        message: String,
    },

    /// No value lives at the requested path
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// A scalar or sequence was found where a map was required
    #[error("path '{0}' does not name a map")]
    PathNotMap(String),

    /// The decoder has no typed accessor for the section
    #[error("section '{0}' not implemented by decoder")]
    NotImplemented(String),

    /// The decode target slot was absent
    #[error("decode target is missing")]
    InvalidTarget,

    /// No source factory is registered for the source's type
    #[error("source '{source_name}': no factory registered for type '{kind}'")]
    FactoryNotFound {
        /// Name of the source entry
        source_name: String,
        /// Unregistered type tag
        kind: String,
    },

    /// The source cannot watch for changes
    #[error("source '{0}' does not support watching")]
    WatchUnsupported(String),

    /// I/O error while reading or watching a source
    #[error("IO error: {0}")]
    Io(String),
}

impl ConfigError {
    /// Build a `SourceLoad` error.
    pub fn source_load(name: impl Into<String>, reason: impl fmt::Display) -> Self {
        ConfigError::SourceLoad {
            source_name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns the flat classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::ConfigInvalid(_) => ErrorKind::ConfigInvalid,
            ConfigError::SourceLoad { .. } => ErrorKind::SourceLoadError,
            ConfigError::DecodeMismatch { .. } => ErrorKind::DecodeMismatch,
            ConfigError::KeyNotFound(_) => ErrorKind::KeyNotFound,
            ConfigError::PathNotMap(_) => ErrorKind::PathNotMap,
            ConfigError::NotImplemented(_) => ErrorKind::NotImplemented,
            ConfigError::InvalidTarget => ErrorKind::InvalidTarget,
            ConfigError::FactoryNotFound { .. } => ErrorKind::FactoryNotFound,
            ConfigError::WatchUnsupported(_) => ErrorKind::WatchUnsupported,
            ConfigError::Io(_) => ErrorKind::Io,
        }
    }

    /// True when the error means "section absent" rather than "section broken".
    pub fn is_absent(&self) -> bool {
        matches!(
            self,
            ConfigError::KeyNotFound(_) | ConfigError::NotImplemented(_)
        )
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<notify::Error> for ConfigError {
    fn from(err: notify::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

/// Errors that can occur in factory registry operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Factory already registered under this tag
    #[error("factory already registered: {0}")]
    DuplicateFactory(String),

    /// No factory registered under this tag
    #[error("factory not found: {0}")]
    FactoryNotFound(String),

    /// Empty type tag
    #[error("invalid factory tag: {0:?}")]
    InvalidTag(String),
}

impl RegistryError {
    /// Returns the flat classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::DuplicateFactory(_) => ErrorKind::DuplicateFactory,
            RegistryError::FactoryNotFound(_) => ErrorKind::FactoryNotFound,
            RegistryError::InvalidTag(_) => ErrorKind::ConfigInvalid,
        }
    }
}

/// Errors raised by collaborator factories while building a component.
#[derive(Error, Debug, Clone)]
pub enum ComponentError {
    /// The factory does not support this side or variant
    #[error("not supported: {0}")]
    Unsupported(String),

    /// Component construction failed
    #[error("component build failed: {0}")]
    BuildFailed(String),

    /// Component configuration was rejected
    #[error("component configuration error: {0}")]
    Configuration(String),

    /// IO error during component construction or release
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ComponentError {
    fn from(err: std::io::Error) -> Self {
        ComponentError::Io(err.to_string())
    }
}

impl From<ConfigError> for ComponentError {
    fn from(err: ConfigError) -> Self {
        ComponentError::Configuration(err.to_string())
    }
}

impl From<String> for ComponentError {
    fn from(msg: String) -> Self {
        ComponentError::BuildFailed(msg)
    }
}

impl From<&str> for ComponentError {
    fn from(msg: &str) -> Self {
        ComponentError::BuildFailed(msg.to_string())
    }
}

/// Root error type returned by [`crate::load`].
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// Source, pipeline or decoder failure
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Factory registry failure
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Application identity incomplete after merging options and config
    #[error("missing app info: {} empty", .0.join(", "))]
    MissingAppInfo(Vec<&'static str>),

    /// The configured default registrar was never built
    #[error("default registrar '{0}' not found")]
    DefaultRegistrarMissing(String),

    /// The caller-supplied transformer rejected the configuration
    #[error("configuration transformer failed: {0}")]
    Transform(String),
}

impl BootstrapError {
    /// Returns the flat classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BootstrapError::Config(err) => err.kind(),
            BootstrapError::Registry(err) => err.kind(),
            BootstrapError::MissingAppInfo(_) => ErrorKind::MissingAppInfo,
            BootstrapError::DefaultRegistrarMissing(_) => ErrorKind::DefaultRegistrarMissing,
            BootstrapError::Transform(_) => ErrorKind::TransformFailed,
        }
    }
}

/// Result type alias for source, pipeline and decoder operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type alias for collaborator factories.
pub type ComponentResult<T> = Result<T, ComponentError>;

/// Result type alias for bootstrap.
pub type BootstrapResult<T> = Result<T, BootstrapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_addressable() {
        let err = BootstrapError::from(ConfigError::KeyNotFound("app".to_string()));
        assert_eq!(err.kind(), ErrorKind::KeyNotFound);

        let err = BootstrapError::from(RegistryError::DuplicateFactory("file".to_string()));
        assert_eq!(err.kind(), ErrorKind::DuplicateFactory);

        let err = BootstrapError::MissingAppInfo(vec!["id", "version"]);
        assert_eq!(err.kind(), ErrorKind::MissingAppInfo);
        assert_eq!(err.to_string(), "missing app info: id, version empty");
    }

    #[test]
    fn test_absent_errors() {
        assert!(ConfigError::KeyNotFound("x".into()).is_absent());
        assert!(ConfigError::NotImplemented("logger".into()).is_absent());
        assert!(!ConfigError::PathNotMap("x".into()).is_absent());
    }
}

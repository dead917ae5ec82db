//! Prelude module for convenient imports.
//!
//! ```rust
//! use bootstrata::prelude::*;
//! ```

// Bootstrap
pub use crate::bootstrap::{load, Bootstrapped};
pub use crate::cleanup::Cleanup;
pub use crate::options::Options;

// Identity and container
pub use crate::app::{AppInfo, ServiceInstance};
pub use crate::container::Container;

// Component contracts
pub use crate::component::{
    Component, ComponentExt, Discovery, Middleware, Registrar, Side, StorageProvider,
};
pub use crate::factory::{
    BuiltComponent, ComponentFactory, Factories, MiddlewareFactory, RegistryFactory,
    StorageFactory,
};

// Configuration
pub use crate::decoder::{ConfigDecoder, ConfigDecoderExt};
pub use crate::pipeline::{LoadedView, SourcePipeline};
pub use crate::sections::{
    AppInfoConfig, DiscoveryConfig, LoggerConfig, MiddlewareConfig, StorageConfig,
};
pub use crate::source::{KeyValue, Source, SourceConfig, Watcher};
pub use crate::structured::StructuredConfig;
pub use crate::value::Value;

// Errors
pub use crate::error::{
    BootstrapError, BootstrapResult, ComponentError, ComponentResult, ConfigError, ConfigResult,
    ErrorKind,
};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

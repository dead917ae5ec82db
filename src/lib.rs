//! # Bootstrata
//!
//! **Bootstrata** (Bootstrap + Strata) assembles a running service from a
//! small bootstrap file: it loads configuration from layered sources,
//! decodes the well-known sections and builds the logger, service
//! discovery, middlewares, storage and user components into a read-only
//! [`Container`].
//!
//! ## Overview
//!
//! ```text
//! bootstrap file ─► SourcePipeline ─► LoadedView ─► StructuredConfig
//!                   (file, env, …)    (merged)      (typed sections)
//!                                                        │
//!                           Container ◄── factories ◄────┘
//! ```
//!
//! - **Sources** produce records; the pipeline merges them by priority
//!   (higher wins, ties go to the later-declared source).
//! - **Decoding** is weakly typed: `"8080"` decodes into a `u16`.
//!   Human-readable durations such as `"30s"` decode into a `Duration`
//!   field marked `#[serde(with = "bootstrata::de::duration")]`; serde's
//!   own `Duration` impl expects a `{secs, nanos}` map.
//! - **Factories** are registered process-wide by tag; registering a tag
//!   twice fails at registration time.
//! - **Cleanup** releases everything in reverse acquisition order, once.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bootstrata::prelude::*;
//!
//! let boot = bootstrata::load(
//!     "config/bootstrap.yaml",
//!     Options::new().with_app_info(AppInfo::new("svc-1", "svc", "1.0.0")),
//! )?;
//!
//! let container = boot.container();
//! container.logger().in_scope(|| tracing::info!("ready"));
//! let pool = container.component_as::<DbPool>("db");
//!
//! boot.cleanup().run();
//! ```

mod app;
mod bootstrap;
mod cleanup;
mod component;
mod container;
pub mod de;
mod decoder;
mod error;
mod factory;
mod format;
mod logger;
mod options;
mod pipeline;
mod registry;
pub mod sections;
pub mod source;
pub mod stream;
mod structured;
mod value;

pub mod prelude;

pub use app::{AppInfo, ServiceInstance};
pub use bootstrap::{load, Bootstrap, Bootstrapped};
pub use cleanup::Cleanup;
pub use component::{
    Component, ComponentExt, Discovery, Middleware, NoopStorageProvider, Registrar, Side,
    StaticStorageProvider, StorageProvider,
};
pub use container::Container;
pub use decoder::{ConfigDecoder, ConfigDecoderExt, SectionCache, ViewDecoder};
pub use error::{
    BootstrapError, BootstrapResult, BoxError, ComponentError, ComponentResult, ConfigError,
    ConfigResult, ErrorKind, RegistryError, RegistryResult,
};
pub use factory::{
    register_component_factory, register_middleware_factory, register_registry_factory,
    register_storage_factory, BuiltComponent, ComponentFactory, ComponentFactoryRegistry,
    Factories, MiddlewareFactory, MiddlewareFactoryRegistry, RegistryFactory,
    RegistryFactoryRegistry, ReleaseFn, StorageFactory, StorageFactoryRegistry, DEFAULT_STORAGE,
};
pub use format::{decode_any_document, env_key_segments, Format};
pub use logger::Logger;
pub use options::{Options, Transformer, OPTIONS_ENV_SOURCE};
pub use pipeline::{LoadedView, PipelineWatch, SourcePipeline, ViewChange};
pub use registry::{Registry, SharedRegistry};
pub use sections::{
    AppInfoConfig, ComponentConfig, DiscoveryConfig, LogFileConfig, LogFormat, LogLevel,
    LoggerConfig, MiddlewareConfig, MiddlewaresConfig, RegistriesConfig, StorageConfig,
};
pub use source::{
    register_source_factory, source_factories, ChangeEvent, EnvSource, FileSource, KeyValue,
    Layout, NoopWatcher, Source, SourceConfig, SourceContext, SourceFactory,
    SourceFactoryRegistry, Watcher,
};
pub use stream::{EventSender, EventStream, StreamBuilder};
pub use structured::{default_paths, StructuredConfig};
pub use value::{Map, Value};

// Re-export async-trait for collaborators implementing the async traits
pub use async_trait::async_trait;

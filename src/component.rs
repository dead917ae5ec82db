//! Component contracts consumed from collaborators.
//!
//! Discovery backends, registrars, middlewares and storage providers are
//! built by factories living outside this crate. The traits here are the
//! narrow surface the container hands back to user code; concrete types are
//! reachable through [`ComponentExt::downcast_ref`].

use std::any::Any;
use std::fmt::Debug;

use async_trait::async_trait;

use crate::app::ServiceInstance;
use crate::error::ComponentResult;
use crate::sections::StorageConfig;

/// Base trait for everything the container holds.
///
/// # Example
///
/// ```rust
/// use bootstrata::{Component, ComponentExt};
/// use std::any::Any;
///
/// #[derive(Debug)]
/// struct Tracer;
///
/// impl Component for Tracer {
///     fn kind(&self) -> &str {
///         "tracer"
///     }
///
///     fn as_any(&self) -> &dyn Any {
///         self
///     }
/// }
///
/// let tracer = Tracer;
/// assert!(tracer.is::<Tracer>());
/// ```
pub trait Component: Send + Sync + Debug {
    /// Type tag the component was built for.
    fn kind(&self) -> &str;

    /// Downcast to concrete type for advanced usage.
    fn as_any(&self) -> &dyn Any;

    /// Release resources held by the component.
    fn close(&self) -> ComponentResult<()> {
        Ok(())
    }
}

/// Extension trait for component type checking.
pub trait ComponentExt: Component {
    /// Check if this component is of type T.
    fn is<T: Component + 'static>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Downcast to type T.
    fn downcast_ref<T: Component + 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

impl<C: Component + ?Sized> ComponentExt for C {}

/// Service-discovery reader.
#[async_trait]
pub trait Discovery: Component {
    /// Resolve the live instances of `service`.
    async fn get_service(&self, service: &str) -> ComponentResult<Vec<ServiceInstance>>;
}

/// Service-discovery writer.
#[async_trait]
pub trait Registrar: Component {
    /// Announce `instance`.
    async fn register(&self, instance: &ServiceInstance) -> ComponentResult<()>;

    /// Withdraw `instance`.
    async fn deregister(&self, instance: &ServiceInstance) -> ComponentResult<()>;
}

/// Which side of a call a middleware wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Incoming requests
    Server,
    /// Outgoing requests
    Client,
}

/// A composable wrapper around a request/response pipeline.
pub trait Middleware: Component {
    /// The side this instance was built for.
    fn side(&self) -> Side;
}

/// Access to file stores, caches and databases.
pub trait StorageProvider: Component {
    /// Names of the configured file stores.
    fn filestores(&self) -> Vec<String> {
        Vec::new()
    }

    /// Names of the configured caches.
    fn caches(&self) -> Vec<String> {
        Vec::new()
    }

    /// Names of the configured databases.
    fn databases(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Storage provider used when no storage section is configured.
#[derive(Debug, Clone, Default)]
pub struct NoopStorageProvider;

impl Component for NoopStorageProvider {
    fn kind(&self) -> &str {
        "noop"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl StorageProvider for NoopStorageProvider {}

/// Storage provider that only records the names of the configured stores.
///
/// Registered under the `default` storage tag.
#[derive(Debug, Clone, Default)]
pub struct StaticStorageProvider {
    config: StorageConfig,
}

impl StaticStorageProvider {
    /// Provider describing `config`.
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    /// The section the provider was built from.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }
}

impl Component for StaticStorageProvider {
    fn kind(&self) -> &str {
        "default"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl StorageProvider for StaticStorageProvider {
    fn filestores(&self) -> Vec<String> {
        self.config.filestores.keys().cloned().collect()
    }

    fn caches(&self) -> Vec<String> {
        self.config.caches.keys().cloned().collect()
    }

    fn databases(&self) -> Vec<String> {
        self.config.databases.keys().cloned().collect()
    }
}

//! Collaborator factories and their process-wide registries.
//!
//! Collaborators register their factories once, during initialization, with
//! the `register_*` functions. Registration of a tag that already exists
//! fails immediately. [`Factories::global`] takes a snapshot of everything
//! registered so far; tests and embedders can assemble their own
//! [`Factories`] instead.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::component::{Discovery, Middleware, Registrar, StaticStorageProvider, StorageProvider};
use crate::container::Container;
use crate::error::{BoxError, ComponentResult, RegistryResult};
use crate::registry::{Registry, SharedRegistry};
use crate::sections::{DiscoveryConfig, MiddlewareConfig, StorageConfig};
use crate::source::{builtin_source_factories, source_factories, SourceFactoryRegistry};
use crate::structured::StructuredConfig;

/// Tag of the storage factory used when the section names no type.
pub const DEFAULT_STORAGE: &str = "default";

/// Builds the discovery reader and writer for one `registries.discoveries`
/// entry.
pub trait RegistryFactory: Send + Sync {
    /// Build both halves for the entry named `name`.
    fn build(
        &self,
        name: &str,
        config: &DiscoveryConfig,
    ) -> ComponentResult<(Arc<dyn Discovery>, Arc<dyn Registrar>)>;
}

impl<F> RegistryFactory for F
where
    F: Fn(&str, &DiscoveryConfig) -> ComponentResult<(Arc<dyn Discovery>, Arc<dyn Registrar>)>
        + Send
        + Sync,
{
    fn build(
        &self,
        name: &str,
        config: &DiscoveryConfig,
    ) -> ComponentResult<(Arc<dyn Discovery>, Arc<dyn Registrar>)> {
        self(name, config)
    }
}

/// Builds the server and client side of a middleware type.
///
/// `Ok(None)` means the side is not supported by this middleware.
pub trait MiddlewareFactory: Send + Sync {
    /// Build the server-side middleware.
    fn build_server(&self, config: &MiddlewareConfig) -> ComponentResult<Option<Arc<dyn Middleware>>> {
        let _ = config;
        Ok(None)
    }

    /// Build the client-side middleware.
    fn build_client(&self, config: &MiddlewareConfig) -> ComponentResult<Option<Arc<dyn Middleware>>> {
        let _ = config;
        Ok(None)
    }
}

/// Builds the storage provider from the `storage` section.
pub trait StorageFactory: Send + Sync {
    /// Build the provider.
    fn build(&self, config: &StorageConfig) -> ComponentResult<Arc<dyn StorageProvider>>;
}

impl<F> StorageFactory for F
where
    F: Fn(&StorageConfig) -> ComponentResult<Arc<dyn StorageProvider>> + Send + Sync,
{
    fn build(&self, config: &StorageConfig) -> ComponentResult<Arc<dyn StorageProvider>> {
        self(config)
    }
}

/// Hook run at cleanup to release a generic component.
pub type ReleaseFn = Box<dyn FnOnce() -> Result<(), BoxError> + Send>;

/// A generic component and its optional release hook.
pub struct BuiltComponent {
    /// The component; retrieve it with [`Container::component_as`]
    pub component: Arc<dyn Any + Send + Sync>,
    /// Run once during cleanup
    pub release: Option<ReleaseFn>,
}

impl BuiltComponent {
    /// A component without a release hook.
    pub fn new<T: Any + Send + Sync>(component: T) -> Self {
        Self {
            component: Arc::new(component),
            release: None,
        }
    }

    /// Attach a release hook.
    pub fn with_release<F>(mut self, release: F) -> Self
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        self.release = Some(Box::new(release));
        self
    }
}

impl fmt::Debug for BuiltComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltComponent")
            .field("release", &self.release.is_some())
            .finish()
    }
}

/// Builds a user-defined component from the whole configuration and the
/// container built so far.
pub trait ComponentFactory: Send + Sync {
    /// Build the component.
    fn build(&self, config: &StructuredConfig, container: &Container) -> ComponentResult<BuiltComponent>;
}

impl<F> ComponentFactory for F
where
    F: Fn(&StructuredConfig, &Container) -> ComponentResult<BuiltComponent> + Send + Sync,
{
    fn build(&self, config: &StructuredConfig, container: &Container) -> ComponentResult<BuiltComponent> {
        self(config, container)
    }
}

/// Registry of discovery backends keyed by type tag.
pub type RegistryFactoryRegistry = Registry<dyn RegistryFactory>;
/// Registry of middleware factories keyed by middleware type.
pub type MiddlewareFactoryRegistry = Registry<dyn MiddlewareFactory>;
/// Registry of storage factories keyed by storage type.
pub type StorageFactoryRegistry = Registry<dyn StorageFactory>;
/// Registry of generic component factories keyed by component name.
pub type ComponentFactoryRegistry = Registry<dyn ComponentFactory>;

fn build_static_storage(config: &StorageConfig) -> ComponentResult<Arc<dyn StorageProvider>> {
    Ok(Arc::new(StaticStorageProvider::new(config.clone())))
}

fn builtin_storage_factories() -> StorageFactoryRegistry {
    let mut registry = StorageFactoryRegistry::new();
    // Fresh registry; the tag cannot collide.
    let _ = registry.register(DEFAULT_STORAGE, Arc::new(build_static_storage));
    registry
}

static REGISTRY_FACTORIES: Lazy<SharedRegistry<dyn RegistryFactory>> = Lazy::new(SharedRegistry::new);
static MIDDLEWARE_FACTORIES: Lazy<SharedRegistry<dyn MiddlewareFactory>> =
    Lazy::new(SharedRegistry::new);
static STORAGE_FACTORIES: Lazy<SharedRegistry<dyn StorageFactory>> =
    Lazy::new(|| SharedRegistry::from_registry(builtin_storage_factories()));
static COMPONENT_FACTORIES: Lazy<SharedRegistry<dyn ComponentFactory>> =
    Lazy::new(SharedRegistry::new);

/// Register a discovery backend process-wide.
pub fn register_registry_factory(
    tag: impl Into<String>,
    factory: Arc<dyn RegistryFactory>,
) -> RegistryResult<()> {
    REGISTRY_FACTORIES.register(tag, factory)
}

/// Register a middleware type process-wide.
pub fn register_middleware_factory(
    tag: impl Into<String>,
    factory: Arc<dyn MiddlewareFactory>,
) -> RegistryResult<()> {
    MIDDLEWARE_FACTORIES.register(tag, factory)
}

/// Register a storage type process-wide.
pub fn register_storage_factory(
    tag: impl Into<String>,
    factory: Arc<dyn StorageFactory>,
) -> RegistryResult<()> {
    STORAGE_FACTORIES.register(tag, factory)
}

/// Register a generic component process-wide. Components are built in
/// registration order.
pub fn register_component_factory(
    name: impl Into<String>,
    factory: Arc<dyn ComponentFactory>,
) -> RegistryResult<()> {
    COMPONENT_FACTORIES.register(name, factory)
}

/// Every factory registry the orchestrator consults.
#[derive(Clone)]
pub struct Factories {
    /// Source factories
    pub sources: SourceFactoryRegistry,
    /// Discovery backends
    pub registries: RegistryFactoryRegistry,
    /// Middleware types
    pub middlewares: MiddlewareFactoryRegistry,
    /// Storage types
    pub storage: StorageFactoryRegistry,
    /// Generic components
    pub components: ComponentFactoryRegistry,
}

impl Factories {
    /// Only the built-in `file`/`env` sources and `default` storage.
    pub fn builtin() -> Self {
        Self {
            sources: builtin_source_factories(),
            registries: Registry::new(),
            middlewares: Registry::new(),
            storage: builtin_storage_factories(),
            components: Registry::new(),
        }
    }

    /// Snapshot of the process-wide registries.
    pub fn global() -> Self {
        Self {
            sources: source_factories(),
            registries: REGISTRY_FACTORIES.snapshot(),
            middlewares: MIDDLEWARE_FACTORIES.snapshot(),
            storage: STORAGE_FACTORIES.snapshot(),
            components: COMPONENT_FACTORIES.snapshot(),
        }
    }

    /// Registered tags per registry, for diagnostics.
    pub fn describe(&self) -> Vec<(&'static str, Vec<String>)> {
        vec![
            ("sources", self.sources.list()),
            ("registries", self.registries.list()),
            ("middlewares", self.middlewares.list()),
            ("storage", self.storage.list()),
            ("components", self.components.list()),
        ]
    }
}

impl Default for Factories {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for Factories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Factories");
        for (name, tags) in self.describe() {
            s.field(name, &tags);
        }
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Component;
    use crate::error::ComponentError;

    struct Unsupported;

    impl MiddlewareFactory for Unsupported {}

    #[test]
    fn test_builtin_factories() {
        let factories = Factories::builtin();
        let described = factories.describe();
        assert_eq!(described[0], ("sources", vec!["file".to_string(), "env".to_string()]));
        assert_eq!(described[3], ("storage", vec![DEFAULT_STORAGE.to_string()]));
        assert!(factories.components.is_empty());
    }

    #[test]
    fn test_global_component_registration_is_checked() {
        let factory: Arc<dyn ComponentFactory> = Arc::new(
            |_: &StructuredConfig, _: &Container| -> ComponentResult<BuiltComponent> {
                Ok(BuiltComponent::new(7u32))
            },
        );
        register_component_factory("factory-test-counter", Arc::clone(&factory)).unwrap();
        let err = register_component_factory("factory-test-counter", factory).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::DuplicateFactory);
        assert!(Factories::global()
            .components
            .contains("factory-test-counter"));
    }

    #[test]
    fn test_default_middleware_sides_are_unsupported() {
        let config = MiddlewareConfig::default();
        assert!(Unsupported.build_server(&config).unwrap().is_none());
        assert!(Unsupported.build_client(&config).unwrap().is_none());
    }

    #[test]
    fn test_default_storage_factory() {
        let factory = Factories::builtin().storage.get(DEFAULT_STORAGE).unwrap();
        let provider = factory.build(&StorageConfig::default()).unwrap();
        assert_eq!(provider.kind(), "default");

        let failing: Arc<dyn StorageFactory> = Arc::new(
            |_: &StorageConfig| -> ComponentResult<Arc<dyn StorageProvider>> {
                Err(ComponentError::BuildFailed("no disk".to_string()))
            },
        );
        assert!(failing.build(&StorageConfig::default()).is_err());
    }
}

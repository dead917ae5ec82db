//! The read-only service locator handed to user code.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::component::{
    Component, Discovery, Middleware, NoopStorageProvider, Registrar, StorageProvider,
};
use crate::logger::Logger;

/// Everything built during bootstrap.
///
/// The container is filled by the orchestrator and frozen behind an `Arc`
/// before it reaches user code; there is no mutating method in the public
/// API.
pub struct Container {
    logger: Logger,
    discoveries: BTreeMap<String, Arc<dyn Discovery>>,
    registrars: BTreeMap<String, Arc<dyn Registrar>>,
    default_registrar: Option<Arc<dyn Registrar>>,
    server_middlewares: BTreeMap<String, Arc<dyn Middleware>>,
    client_middlewares: BTreeMap<String, Arc<dyn Middleware>>,
    storage: Arc<dyn StorageProvider>,
    components: BTreeMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Container {
    pub(crate) fn new(logger: Logger) -> Self {
        Self {
            logger,
            discoveries: BTreeMap::new(),
            registrars: BTreeMap::new(),
            default_registrar: None,
            server_middlewares: BTreeMap::new(),
            client_middlewares: BTreeMap::new(),
            storage: Arc::new(NoopStorageProvider),
            components: BTreeMap::new(),
        }
    }

    pub(crate) fn insert_registry(
        &mut self,
        name: &str,
        discovery: Arc<dyn Discovery>,
        registrar: Arc<dyn Registrar>,
    ) {
        self.discoveries.insert(name.to_string(), discovery);
        self.registrars.insert(name.to_string(), registrar);
    }

    pub(crate) fn set_default_registrar(&mut self, registrar: Arc<dyn Registrar>) {
        self.default_registrar = Some(registrar);
    }

    pub(crate) fn insert_server_middleware(&mut self, kind: &str, mw: Arc<dyn Middleware>) {
        self.server_middlewares.insert(kind.to_string(), mw);
    }

    pub(crate) fn insert_client_middleware(&mut self, kind: &str, mw: Arc<dyn Middleware>) {
        self.client_middlewares.insert(kind.to_string(), mw);
    }

    pub(crate) fn set_storage(&mut self, storage: Arc<dyn StorageProvider>) {
        self.storage = storage;
    }

    pub(crate) fn insert_component(&mut self, name: &str, component: Arc<dyn Any + Send + Sync>) {
        self.components.insert(name.to_string(), component);
    }

    /// The configured logger.
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Discovery reader built for the entry `name`.
    pub fn discovery(&self, name: &str) -> Option<Arc<dyn Discovery>> {
        self.discoveries.get(name).cloned()
    }

    /// All discovery readers by entry name.
    pub fn discoveries(&self) -> &BTreeMap<String, Arc<dyn Discovery>> {
        &self.discoveries
    }

    /// Registrar built for the entry `name`.
    pub fn registrar(&self, name: &str) -> Option<Arc<dyn Registrar>> {
        self.registrars.get(name).cloned()
    }

    /// All registrars by entry name.
    pub fn registrars(&self) -> &BTreeMap<String, Arc<dyn Registrar>> {
        &self.registrars
    }

    /// The registrar named by `registries.default`, if configured.
    pub fn default_registrar(&self) -> Option<Arc<dyn Registrar>> {
        self.default_registrar.clone()
    }

    /// Server-side middleware of type `kind`.
    pub fn server_middleware(&self, kind: &str) -> Option<Arc<dyn Middleware>> {
        self.server_middlewares.get(kind).cloned()
    }

    /// All server-side middlewares by type.
    pub fn server_middlewares(&self) -> &BTreeMap<String, Arc<dyn Middleware>> {
        &self.server_middlewares
    }

    /// Client-side middleware of type `kind`.
    pub fn client_middleware(&self, kind: &str) -> Option<Arc<dyn Middleware>> {
        self.client_middlewares.get(kind).cloned()
    }

    /// All client-side middlewares by type.
    pub fn client_middlewares(&self) -> &BTreeMap<String, Arc<dyn Middleware>> {
        &self.client_middlewares
    }

    /// The storage provider; a no-op provider when storage is not configured.
    pub fn storage(&self) -> Arc<dyn StorageProvider> {
        Arc::clone(&self.storage)
    }

    /// Generic component registered under `name`.
    pub fn component(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.components.get(name).cloned()
    }

    /// Generic component downcast to its concrete type.
    pub fn component_as<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.component(name)?.downcast::<T>().ok()
    }

    /// All generic components by name.
    pub fn components(&self) -> &BTreeMap<String, Arc<dyn Any + Send + Sync>> {
        &self.components
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("logger", &self.logger)
            .field("discoveries", &self.discoveries.keys().collect::<Vec<_>>())
            .field("registrars", &self.registrars.keys().collect::<Vec<_>>())
            .field("default_registrar", &self.default_registrar.is_some())
            .field("server_middlewares", &self.server_middlewares.keys().collect::<Vec<_>>())
            .field("client_middlewares", &self.client_middlewares.keys().collect::<Vec<_>>())
            .field("storage", &self.storage.kind())
            .field("components", &self.components.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentExt;

    #[derive(Debug)]
    struct Pool {
        size: usize,
    }

    #[test]
    fn test_empty_container() {
        let container = Container::new(Logger::default());
        assert!(container.discovery("primary").is_none());
        assert!(container.default_registrar().is_none());
        assert!(container.server_middlewares().is_empty());
        assert!(container.storage().is::<NoopStorageProvider>());
    }

    #[test]
    fn test_typed_component_lookup() {
        let mut container = Container::new(Logger::default());
        container.insert_component("pool", Arc::new(Pool { size: 4 }));

        assert_eq!(container.component_as::<Pool>("pool").unwrap().size, 4);
        assert!(container.component_as::<String>("pool").is_none());
        assert!(container.component_as::<Pool>("missing").is_none());
        assert_eq!(container.components().len(), 1);
        assert_eq!(container.storage().kind(), "noop");
    }
}

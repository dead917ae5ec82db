//! Tag-keyed factory registries.
//!
//! A `Registry` maps a type tag (`"file"`, `"env"`, `"consul"`, ...) to a
//! factory. Registration of a tag that is already present fails with
//! [`RegistryError::DuplicateFactory`] so link-order mistakes surface where
//! they are made, not at bootstrap time. Iteration follows registration
//! order.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{RegistryError, RegistryResult};

/// A registry of factories keyed by type tag.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use bootstrata::Registry;
///
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
///
/// struct English;
/// impl Greeter for English {
///     fn greet(&self) -> String { "hello".to_string() }
/// }
///
/// let mut registry: Registry<dyn Greeter> = Registry::new();
/// registry.register("en", Arc::new(English)).unwrap();
///
/// assert!(registry.register("en", Arc::new(English)).is_err());
/// assert_eq!(registry.get("en").unwrap().greet(), "hello");
/// ```
pub struct Registry<F: ?Sized> {
    factories: HashMap<String, Arc<F>>,
    ordered: Vec<String>,
}

impl<F: ?Sized> Registry<F> {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            ordered: Vec::new(),
        }
    }

    /// Register a factory under `tag`.
    ///
    /// Fails if the tag is empty or already registered; an existing entry is
    /// never replaced.
    pub fn register(&mut self, tag: impl Into<String>, factory: Arc<F>) -> RegistryResult<()> {
        let tag = tag.into();
        if tag.trim().is_empty() {
            return Err(RegistryError::InvalidTag(tag));
        }
        if self.factories.contains_key(&tag) {
            return Err(RegistryError::DuplicateFactory(tag));
        }
        self.ordered.push(tag.clone());
        self.factories.insert(tag, factory);
        Ok(())
    }

    /// Look up the factory registered under `tag`.
    pub fn get(&self, tag: &str) -> RegistryResult<Arc<F>> {
        self.factories
            .get(tag)
            .cloned()
            .ok_or_else(|| RegistryError::FactoryNotFound(tag.to_string()))
    }

    /// Check if a factory with the given tag is registered.
    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    /// Snapshot of the registered tags, in registration order.
    pub fn list(&self) -> Vec<String> {
        self.ordered.clone()
    }

    /// Get the number of registered factories.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Iterate over `(tag, factory)` pairs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<F>)> {
        self.ordered
            .iter()
            .filter_map(move |tag| self.factories.get(tag).map(|f| (tag.as_str(), f)))
    }
}

impl<F: ?Sized> Default for Registry<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> Clone for Registry<F> {
    fn clone(&self) -> Self {
        Self {
            factories: self.factories.clone(),
            ordered: self.ordered.clone(),
        }
    }
}

impl<F: ?Sized> fmt::Debug for Registry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("tags", &self.ordered)
            .finish()
    }
}

/// Process-wide registry: written during initialization, read concurrently
/// afterwards.
pub struct SharedRegistry<F: ?Sized> {
    inner: RwLock<Registry<F>>,
}

impl<F: ?Sized> SharedRegistry<F> {
    /// Create an empty shared registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Registry::new()),
        }
    }

    /// Wrap an existing registry.
    pub fn from_registry(registry: Registry<F>) -> Self {
        Self {
            inner: RwLock::new(registry),
        }
    }

    /// Register a factory; see [`Registry::register`].
    pub fn register(&self, tag: impl Into<String>, factory: Arc<F>) -> RegistryResult<()> {
        self.inner.write().register(tag, factory)
    }

    /// Look up a factory; see [`Registry::get`].
    pub fn get(&self, tag: &str) -> RegistryResult<Arc<F>> {
        self.inner.read().get(tag)
    }

    /// Snapshot of the registered tags.
    pub fn list(&self) -> Vec<String> {
        self.inner.read().list()
    }

    /// Point-in-time copy of the registry.
    pub fn snapshot(&self) -> Registry<F> {
        self.inner.read().clone()
    }
}

impl<F: ?Sized> Default for SharedRegistry<F> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Factory: Send + Sync {
        fn id(&self) -> u32;
    }

    struct Numbered(u32);

    impl Factory for Numbered {
        fn id(&self) -> u32 {
            self.0
        }
    }

    #[test]
    fn test_registry_register_and_get() {
        let mut registry: Registry<dyn Factory> = Registry::new();
        registry.register("one", Arc::new(Numbered(1))).unwrap();

        assert_eq!(registry.get("one").unwrap().id(), 1);
        assert_eq!(
            registry.get("two").err(),
            Some(RegistryError::FactoryNotFound("two".to_string()))
        );
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry: Registry<dyn Factory> = Registry::new();
        registry.register("one", Arc::new(Numbered(1))).unwrap();

        let err = registry.register("one", Arc::new(Numbered(2))).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateFactory("one".to_string()));
        assert_eq!(registry.get("one").unwrap().id(), 1);
    }

    #[test]
    fn test_registry_rejects_empty_tag() {
        let mut registry: Registry<dyn Factory> = Registry::new();
        assert!(matches!(
            registry.register(" ", Arc::new(Numbered(1))),
            Err(RegistryError::InvalidTag(_))
        ));
    }

    #[test]
    fn test_registry_preserves_order() {
        let mut registry: Registry<dyn Factory> = Registry::new();
        registry.register("b", Arc::new(Numbered(2))).unwrap();
        registry.register("a", Arc::new(Numbered(1))).unwrap();
        registry.register("c", Arc::new(Numbered(3))).unwrap();

        assert_eq!(registry.list(), vec!["b", "a", "c"]);
        let ids: Vec<u32> = registry.iter().map(|(_, f)| f.id()).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn test_shared_registry_concurrent_reads() {
        let shared: Arc<SharedRegistry<dyn Factory>> = Arc::new(SharedRegistry::new());
        shared.register("one", Arc::new(Numbered(1))).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || shared.get("one").map(|f| f.id()))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), Ok(1));
        }
        assert_eq!(shared.snapshot().list(), vec!["one"]);
    }
}

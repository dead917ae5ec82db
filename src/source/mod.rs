//! Configuration sources.
//!
//! A [`Source`] produces [`KeyValue`] records and, optionally, a
//! [`Watcher`] that reports changes. Sources are built from
//! [`SourceConfig`] entries of the bootstrap file by a [`SourceFactory`]
//! looked up by type tag in a [`SourceFactoryRegistry`].

mod env;
mod file;

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{ConfigError, ConfigResult, RegistryResult};
use crate::format::Format;
use crate::registry::{Registry, SharedRegistry};
use crate::value::Value;

pub use env::EnvSource;
pub use file::{FileSource, FileWatcher, MAX_WALK_DEPTH};

/// Type tag of the built-in file source.
pub const FILE_SOURCE: &str = "file";
/// Type tag of the built-in environment source.
pub const ENV_SOURCE: &str = "env";

/// A single record produced by a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// File base name, environment suffix or remote key
    pub key: String,
    /// How `value` is decoded
    pub format: Format,
    /// Opaque payload
    pub value: Vec<u8>,
}

impl KeyValue {
    /// Create a record.
    pub fn new(key: impl Into<String>, format: Format, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            format,
            value: value.into(),
        }
    }
}

/// How a source's records contribute to the merged tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    /// Each record is a complete document merged at the root.
    #[default]
    Documents,
    /// Each record's key is a path; its value is the leaf at that path.
    Entries,
}

/// A batch of changes reported by a [`Watcher`].
///
/// Consumers treat an event as "re-load and re-merge".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Name of the source that changed
    pub source: String,
    /// Keys touched by the change, including removed ones
    pub changed_keys: Vec<String>,
    /// Current records for the keys that still exist
    pub values: Vec<KeyValue>,
}

/// A producer of configuration records.
pub trait Source: Send + Sync + Debug {
    /// Name of the source entry this source was built from.
    fn name(&self) -> &str;

    /// How records merge into the tree.
    fn layout(&self) -> Layout {
        Layout::Documents
    }

    /// Produce the current records.
    fn load(&self) -> ConfigResult<Vec<KeyValue>>;

    /// Start watching for changes.
    fn watch(&self) -> ConfigResult<Box<dyn Watcher>> {
        Err(ConfigError::WatchUnsupported(self.name().to_string()))
    }

    /// Release handles and background watchers. Idempotent.
    fn close(&self) -> ConfigResult<()> {
        Ok(())
    }
}

/// A single-consumer stream of change events.
#[async_trait]
pub trait Watcher: Send + Sync {
    /// Wait for the next change. Returns `Ok(None)` once stopped.
    async fn next(&self) -> ConfigResult<Option<ChangeEvent>>;

    /// Cancel any in-flight wait and end the stream.
    fn stop(&self);
}

/// Cancellation flag shared by watchers.
#[derive(Debug, Clone)]
pub(crate) struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub(crate) fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub(crate) fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`stop`](Self::stop) has been called.
    pub(crate) async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so `wait_for` only fails if it is dropped.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

/// Watcher for sources that cannot observe changes: `next` blocks until
/// [`Watcher::stop`] and then reports the end of the stream.
#[derive(Debug, Clone)]
pub struct NoopWatcher {
    stop: StopSignal,
}

impl NoopWatcher {
    /// Create a watcher that never yields an event.
    pub fn new() -> Self {
        Self {
            stop: StopSignal::new(),
        }
    }
}

impl Default for NoopWatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Watcher for NoopWatcher {
    async fn next(&self) -> ConfigResult<Option<ChangeEvent>> {
        self.stop.stopped().await;
        Ok(None)
    }

    fn stop(&self) {
        self.stop.stop();
    }
}

/// Parameters of a file source entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSourceConfig {
    /// File or directory path; relative paths resolve against the
    /// bootstrap file's directory
    pub path: String,
    /// Missing paths yield no records instead of failing
    #[serde(default)]
    pub optional: bool,
}

/// Parameters of an environment source entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvSourceConfig {
    /// Variable name prefixes; empty means the source contributes nothing
    #[serde(default)]
    pub prefixes: Vec<String>,
}

/// One entry of the bootstrap file's `sources` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique name within the bootstrap
    pub name: String,
    /// Type tag selecting the factory
    #[serde(rename = "type")]
    pub kind: String,
    /// Merge priority; higher wins
    #[serde(default)]
    pub priority: i64,
    /// Present iff `type = "file"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileSourceConfig>,
    /// Present iff `type = "env"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<EnvSourceConfig>,
    /// Backend-specific sections (`consul`, `etcd`, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl SourceConfig {
    /// A file source entry.
    pub fn file(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FILE_SOURCE.to_string(),
            priority: 0,
            file: Some(FileSourceConfig {
                path: path.into(),
                optional: false,
            }),
            env: None,
            extra: BTreeMap::new(),
        }
    }

    /// An environment source entry.
    pub fn env<I, S>(name: impl Into<String>, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            kind: ENV_SOURCE.to_string(),
            priority: 0,
            file: None,
            env: Some(EnvSourceConfig {
                prefixes: prefixes.into_iter().map(Into::into).collect(),
            }),
            extra: BTreeMap::new(),
        }
    }

    /// Set the merge priority.
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Mark a file source optional.
    pub fn optional(mut self) -> Self {
        if let Some(file) = self.file.as_mut() {
            file.optional = true;
        }
        self
    }

    /// Backend-specific section named after the type tag, if any.
    pub fn backend_section(&self) -> Option<&Value> {
        self.extra.get(&self.kind)
    }

    /// Check the entry's own invariants.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::ConfigInvalid(
                "source entry without a name".to_string(),
            ));
        }
        if self.kind.trim().is_empty() {
            return Err(ConfigError::ConfigInvalid(format!(
                "source '{}' has no type",
                self.name
            )));
        }
        Ok(())
    }
}

/// Context handed to source factories.
#[derive(Debug, Clone, Default)]
pub struct SourceContext {
    /// Directory relative source paths resolve against
    pub base_dir: PathBuf,
}

impl SourceContext {
    /// Context rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Resolve `path` against the base directory.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() || self.base_dir.as_os_str().is_empty() {
            candidate.to_path_buf()
        } else {
            self.base_dir.join(candidate)
        }
    }
}

/// Builds a [`Source`] from its bootstrap entry.
pub trait SourceFactory: Send + Sync {
    /// Construct the source.
    fn build(&self, config: &SourceConfig, ctx: &SourceContext) -> ConfigResult<Box<dyn Source>>;
}

impl<F> SourceFactory for F
where
    F: Fn(&SourceConfig, &SourceContext) -> ConfigResult<Box<dyn Source>> + Send + Sync,
{
    fn build(&self, config: &SourceConfig, ctx: &SourceContext) -> ConfigResult<Box<dyn Source>> {
        self(config, ctx)
    }
}

/// Registry of source factories keyed by type tag.
pub type SourceFactoryRegistry = Registry<dyn SourceFactory>;

fn build_file_source(config: &SourceConfig, ctx: &SourceContext) -> ConfigResult<Box<dyn Source>> {
    let file = config.file.as_ref().ok_or_else(|| {
        ConfigError::ConfigInvalid(format!("source '{}' is missing its file section", config.name))
    })?;
    let source = FileSource::new(&config.name, ctx.resolve(&file.path)).optional(file.optional);
    Ok(Box::new(source))
}

fn build_env_source(config: &SourceConfig, _ctx: &SourceContext) -> ConfigResult<Box<dyn Source>> {
    let prefixes = config
        .env
        .as_ref()
        .map(|env| env.prefixes.clone())
        .unwrap_or_default();
    Ok(Box::new(EnvSource::new(&config.name, prefixes)))
}

/// Registry pre-populated with the built-in `file` and `env` factories.
pub fn builtin_source_factories() -> SourceFactoryRegistry {
    let mut registry = SourceFactoryRegistry::new();
    // Both tags are fresh in a new registry.
    let _ = registry.register(FILE_SOURCE, Arc::new(build_file_source));
    let _ = registry.register(ENV_SOURCE, Arc::new(build_env_source));
    registry
}

static SOURCE_FACTORIES: Lazy<SharedRegistry<dyn SourceFactory>> =
    Lazy::new(|| SharedRegistry::from_registry(builtin_source_factories()));

/// Register a source factory process-wide.
pub fn register_source_factory(
    tag: impl Into<String>,
    factory: Arc<dyn SourceFactory>,
) -> RegistryResult<()> {
    SOURCE_FACTORIES.register(tag, factory)
}

/// Snapshot of the process-wide source factories.
pub fn source_factories() -> SourceFactoryRegistry {
    SOURCE_FACTORIES.snapshot()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_factories() {
        let registry = builtin_source_factories();
        assert_eq!(registry.list(), vec![FILE_SOURCE, ENV_SOURCE]);
    }

    #[test]
    fn test_global_registration_rejects_builtin_tag() {
        let err = register_source_factory(FILE_SOURCE, Arc::new(build_file_source)).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::DuplicateFactory);
        assert!(source_factories().contains(ENV_SOURCE));
    }

    #[test]
    fn test_source_config_validation() {
        assert!(SourceConfig::file("a", "x.yaml").validate().is_ok());
        assert!(SourceConfig::file("", "x.yaml").validate().is_err());

        let mut missing_type = SourceConfig::env("env", ["APP_"]);
        missing_type.kind.clear();
        assert!(matches!(
            missing_type.validate(),
            Err(ConfigError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn test_context_resolves_relative_paths() {
        let ctx = SourceContext::new("/etc/svc");
        assert_eq!(ctx.resolve("conf.d"), PathBuf::from("/etc/svc/conf.d"));
        assert_eq!(ctx.resolve("/abs/x.yaml"), PathBuf::from("/abs/x.yaml"));
    }

    #[test]
    fn test_file_factory_requires_section() {
        let mut config = SourceConfig::file("f", "x.yaml");
        config.file = None;
        let err = build_file_source(&config, &SourceContext::default()).unwrap_err();
        assert!(matches!(err, ConfigError::ConfigInvalid(_)));
    }

    #[tokio::test]
    async fn test_noop_watcher_blocks_until_stopped() {
        let watcher = Arc::new(NoopWatcher::new());
        let waiting = {
            let watcher = Arc::clone(&watcher);
            tokio::spawn(async move { watcher.next().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        watcher.stop();
        assert_eq!(waiting.await.unwrap().unwrap(), None);
    }
}

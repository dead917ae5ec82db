//! Caller options for [`crate::load`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::app::AppInfo;
use crate::error::BoxError;
use crate::factory::Factories;
use crate::structured::StructuredConfig;

/// Name of the env source appended by [`Options::with_env_prefixes`].
pub const OPTIONS_ENV_SOURCE: &str = "options-env";

/// Replaces the loaded configuration before any component is built.
pub type Transformer =
    Arc<dyn Fn(&StructuredConfig) -> Result<StructuredConfig, BoxError> + Send + Sync>;

/// Options accepted by [`crate::load`].
///
/// # Example
///
/// ```rust
/// use bootstrata::{AppInfo, Options};
///
/// let options = Options::new()
///     .with_app_info(AppInfo::new("svc-1", "svc", "1.0.0"))
///     .with_path("logger", "observability.logger")
///     .with_env_prefixes(["SVC_"]);
/// assert_eq!(options.paths()["logger"], "observability.logger");
/// ```
#[derive(Clone)]
pub struct Options {
    app_info: Option<AppInfo>,
    paths: BTreeMap<String, String>,
    transformer: Option<Transformer>,
    env_prefixes: Vec<String>,
    factories: Option<Factories>,
    global_logger: bool,
    fast_path: bool,
}

impl Options {
    /// Default options: no identity, default paths, global registries,
    /// global logger installation on.
    pub fn new() -> Self {
        Self {
            app_info: None,
            paths: BTreeMap::new(),
            transformer: None,
            env_prefixes: Vec::new(),
            factories: None,
            global_logger: true,
            fast_path: true,
        }
    }

    /// Base identity; non-empty fields of the `app` section override it.
    pub fn with_app_info(mut self, app_info: AppInfo) -> Self {
        self.app_info = Some(app_info);
        self
    }

    /// Overlay section paths onto the defaults.
    pub fn with_paths<I, K, V>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.paths
            .extend(paths.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Overlay a single section path. An empty path disables the section.
    pub fn with_path(mut self, section: impl Into<String>, path: impl Into<String>) -> Self {
        self.paths.insert(section.into(), path.into());
        self
    }

    /// Replace the loaded configuration before components are built.
    pub fn with_transformer<F>(mut self, transformer: F) -> Self
    where
        F: Fn(&StructuredConfig) -> Result<StructuredConfig, BoxError> + Send + Sync + 'static,
    {
        self.transformer = Some(Arc::new(transformer));
        self
    }

    /// Append an env source over `prefixes` that outranks every bootstrap
    /// source.
    pub fn with_env_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.env_prefixes
            .extend(prefixes.into_iter().map(Into::into));
        self
    }

    /// Use `factories` instead of the process-wide registries.
    pub fn with_factories(mut self, factories: Factories) -> Self {
        self.factories = Some(factories);
        self
    }

    /// Whether the logger is installed as the process-wide default.
    pub fn with_global_logger(mut self, install: bool) -> Self {
        self.global_logger = install;
        self
    }

    /// Whether well-known sections are served from a pre-decoded cache.
    pub fn with_fast_path(mut self, enabled: bool) -> Self {
        self.fast_path = enabled;
        self
    }

    /// Caller-supplied identity.
    pub fn app_info(&self) -> Option<&AppInfo> {
        self.app_info.as_ref()
    }

    /// Caller path overrides.
    pub fn paths(&self) -> &BTreeMap<String, String> {
        &self.paths
    }

    /// Extra env prefixes.
    pub fn env_prefixes(&self) -> &[String] {
        &self.env_prefixes
    }

    pub(crate) fn transformer(&self) -> Option<&Transformer> {
        self.transformer.as_ref()
    }

    /// The factories bootstrap will use.
    pub fn factories(&self) -> Factories {
        self.factories.clone().unwrap_or_else(Factories::global)
    }

    pub(crate) fn global_logger(&self) -> bool {
        self.global_logger
    }

    pub(crate) fn fast_path(&self) -> bool {
        self.fast_path
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("app_info", &self.app_info)
            .field("paths", &self.paths)
            .field("transformer", &self.transformer.is_some())
            .field("env_prefixes", &self.env_prefixes)
            .field("factories", &self.factories)
            .field("global_logger", &self.global_logger)
            .field("fast_path", &self.fast_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_overlay() {
        let options = Options::new()
            .with_paths([("logger", "a"), ("app", "b")])
            .with_path("logger", "c");
        assert_eq!(options.paths()["logger"], "c");
        assert_eq!(options.paths()["app"], "b");
    }

    #[test]
    fn test_defaults() {
        let options = Options::default();
        assert!(options.app_info().is_none());
        assert!(options.transformer().is_none());
        assert!(options.global_logger());
        assert!(options.fast_path());
        assert!(options.factories().sources.contains("file"));
    }

    #[test]
    fn test_env_prefixes_accumulate() {
        let options = Options::new()
            .with_env_prefixes(["A_"])
            .with_env_prefixes(vec!["B_".to_string()]);
        assert_eq!(options.env_prefixes(), ["A_".to_string(), "B_".to_string()]);
    }
}

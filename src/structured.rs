//! Typed accessors for the well-known sections.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::trace;

use crate::decoder::{ConfigDecoder, ConfigDecoderExt};
use crate::error::{ConfigError, ConfigResult};
use crate::pipeline::LoadedView;
use crate::sections::{
    AppInfoConfig, ComponentConfig, DiscoveryConfig, LoggerConfig, MiddlewaresConfig,
    RegistriesConfig, StorageConfig, APP_SECTION, COMPONENTS_SECTION, LOGGER_SECTION,
    MIDDLEWARES_SECTION, REGISTRIES_SECTION, STORAGE_SECTION,
};
use crate::value::Value;

/// Framework default section paths.
pub fn default_paths() -> BTreeMap<String, String> {
    [
        APP_SECTION,
        LOGGER_SECTION,
        REGISTRIES_SECTION,
        MIDDLEWARES_SECTION,
        STORAGE_SECTION,
        COMPONENTS_SECTION,
    ]
    .into_iter()
    .map(|section| (section.to_string(), section.to_string()))
    .collect()
}

/// A [`ConfigDecoder`] plus typed accessors for the well-known sections.
///
/// Each accessor first asks the decoder's native accessor; when that
/// declines with `NotImplemented` the section is decoded generically from
/// its configured path. An empty or missing path yields `NotImplemented`.
#[derive(Clone)]
pub struct StructuredConfig {
    decoder: Arc<dyn ConfigDecoder>,
    paths: BTreeMap<String, String>,
}

impl fmt::Debug for StructuredConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructuredConfig")
            .field("decoder", &self.decoder)
            .field("paths", &self.paths)
            .finish()
    }
}

impl StructuredConfig {
    /// Wrap `decoder`, overlaying `overrides` onto [`default_paths`].
    pub fn new(decoder: Arc<dyn ConfigDecoder>, overrides: &BTreeMap<String, String>) -> Self {
        let mut paths = default_paths();
        paths.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self { decoder, paths }
    }

    /// The effective section path map.
    pub fn paths(&self) -> &BTreeMap<String, String> {
        &self.paths
    }

    /// Configured path of `section`, if non-empty.
    pub fn path(&self, section: &str) -> Option<&str> {
        self.paths
            .get(section)
            .map(String::as_str)
            .filter(|p| !p.is_empty())
    }

    /// The underlying decoder.
    pub fn decoder(&self) -> &Arc<dyn ConfigDecoder> {
        &self.decoder
    }

    /// The merged view.
    pub fn view(&self) -> LoadedView {
        self.decoder.view()
    }

    /// Clone of the sub-tree at `path`.
    pub fn lookup(&self, path: &str) -> ConfigResult<Value> {
        self.decoder.lookup(path)
    }

    /// Decode the sub-tree at `path` into `T`.
    pub fn decode<T: DeserializeOwned>(&self, path: &str) -> ConfigResult<T> {
        self.decoder.decode(path)
    }

    /// Decode the sub-tree at `path` into an existing slot.
    pub fn decode_into<T: DeserializeOwned>(&self, path: &str, target: Option<&mut T>) -> ConfigResult<()> {
        self.decoder.decode_into(path, target)
    }

    /// Decode the section named `section` from its configured path.
    pub fn section<T: DeserializeOwned>(&self, section: &str) -> ConfigResult<T> {
        let path = self
            .path(section)
            .ok_or_else(|| ConfigError::NotImplemented(section.to_string()))?;
        self.decode(path)
    }

    fn accessor<T, F>(&self, section: &str, fast: F) -> ConfigResult<T>
    where
        T: DeserializeOwned,
        F: FnOnce(&dyn ConfigDecoder) -> ConfigResult<T>,
    {
        match fast(self.decoder.as_ref()) {
            Err(ConfigError::NotImplemented(_)) => {
                trace!(section, "fast path declined; decoding generically");
                self.section(section)
            }
            other => other,
        }
    }

    /// The `app` section.
    pub fn app_info(&self) -> ConfigResult<AppInfoConfig> {
        self.accessor(APP_SECTION, |d| d.app_info())
    }

    /// The `logger` section.
    pub fn logger(&self) -> ConfigResult<LoggerConfig> {
        self.accessor(LOGGER_SECTION, |d| d.logger())
    }

    /// The `registries` section.
    pub fn registries(&self) -> ConfigResult<RegistriesConfig> {
        self.accessor(REGISTRIES_SECTION, |d| d.registries())
    }

    /// Discovery entries of the `registries` section.
    pub fn discoveries(&self) -> ConfigResult<BTreeMap<String, DiscoveryConfig>> {
        self.registries().map(|r| r.discoveries)
    }

    /// The `middlewares` section.
    pub fn middlewares(&self) -> ConfigResult<MiddlewaresConfig> {
        self.accessor(MIDDLEWARES_SECTION, |d| d.middlewares())
    }

    /// The `storage` section.
    pub fn storage(&self) -> ConfigResult<StorageConfig> {
        self.accessor(STORAGE_SECTION, |d| d.storage())
    }

    /// The `components` section.
    pub fn components(&self) -> ConfigResult<BTreeMap<String, ComponentConfig>> {
        self.accessor(COMPONENTS_SECTION, |d| d.components())
    }

    /// Close the decoder and its pipeline.
    pub fn close(&self) {
        self.decoder.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::decoder::{SectionCache, ViewDecoder};
    use crate::format::Format;
    use crate::sections::{LogFormat, LogLevel};
    use crate::ErrorKind;

    fn view(yaml: &str) -> LoadedView {
        LoadedView::new(Format::Yaml.decode(yaml.as_bytes()).unwrap().unwrap())
    }

    const DOC: &str = "app: {id: svc-1, name: Svc, version: 1.0.0}\nlogger: {level: debug, format: json}\nregistries:\n  default: main\n  discoveries: {main: {type: consul}}\nmiddlewares:\n  middlewares: [{type: x, enabled: true}]";

    #[derive(Debug)]
    struct CountingDecoder {
        view: LoadedView,
        calls: AtomicUsize,
    }

    impl ConfigDecoder for CountingDecoder {
        fn view(&self) -> LoadedView {
            self.view.clone()
        }

        fn logger(&self) -> ConfigResult<LoggerConfig> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(LoggerConfig {
                level: LogLevel::Error,
                ..LoggerConfig::default()
            })
        }
    }

    #[test]
    fn test_generic_fallback() {
        let config = StructuredConfig::new(Arc::new(ViewDecoder::new(view(DOC))), &BTreeMap::new());
        assert_eq!(config.app_info().unwrap().id, "svc-1");
        assert_eq!(config.logger().unwrap().format, LogFormat::Json);
        assert_eq!(config.discoveries().unwrap()["main"].kind, "consul");
        assert_eq!(config.middlewares().unwrap().middlewares.len(), 1);
        assert_eq!(config.storage().unwrap_err().kind(), ErrorKind::KeyNotFound);
    }

    #[test]
    fn test_fast_path_is_preferred() {
        let decoder = Arc::new(CountingDecoder {
            view: view(DOC),
            calls: AtomicUsize::new(0),
        });
        let config = StructuredConfig::new(decoder.clone(), &BTreeMap::new());
        assert_eq!(config.logger().unwrap().level, LogLevel::Error);
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(config.app_info().unwrap().name, "Svc");
    }

    #[test]
    fn test_empty_path_is_not_implemented() {
        let overrides = BTreeMap::from([(LOGGER_SECTION.to_string(), String::new())]);
        let config = StructuredConfig::new(Arc::new(ViewDecoder::new(view(DOC))), &overrides);
        assert_eq!(config.logger().unwrap_err().kind(), ErrorKind::NotImplemented);
        assert_eq!(config.section::<Value>("unknown").unwrap_err().kind(), ErrorKind::NotImplemented);
    }

    #[test]
    fn test_overridden_path() {
        let overrides = BTreeMap::from([(LOGGER_SECTION.to_string(), "obs.log".to_string())]);
        let config = StructuredConfig::new(
            Arc::new(ViewDecoder::new(view("obs: {log: {level: warn}}"))),
            &overrides,
        );
        assert_eq!(config.logger().unwrap().level, LogLevel::Warn);
        assert_eq!(config.path(APP_SECTION), Some("app"));
    }

    #[test]
    fn test_fast_path_agrees_with_generic_path() {
        let paths = default_paths();
        let fast = StructuredConfig::new(
            Arc::new(SectionCache::new(ViewDecoder::new(view(DOC)), paths.clone())),
            &BTreeMap::new(),
        );
        let generic = StructuredConfig::new(Arc::new(ViewDecoder::new(view(DOC))), &BTreeMap::new());

        assert_eq!(fast.app_info().unwrap(), generic.app_info().unwrap());
        assert_eq!(fast.logger().unwrap(), generic.logger().unwrap());
        assert_eq!(fast.registries().unwrap(), generic.registries().unwrap());
        assert_eq!(fast.middlewares().unwrap(), generic.middlewares().unwrap());
        assert_eq!(
            fast.logger().unwrap(),
            fast.decode::<LoggerConfig>(&paths[LOGGER_SECTION]).unwrap()
        );
    }
}

//! Path-addressed decoding of the merged view into typed values.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;

use crate::de::from_value;
use crate::error::{ConfigError, ConfigResult};
use crate::pipeline::{LoadedView, SourcePipeline};
use crate::sections::{
    AppInfoConfig, ComponentConfig, LoggerConfig, MiddlewaresConfig, RegistriesConfig,
    StorageConfig, APP_SECTION, COMPONENTS_SECTION, LOGGER_SECTION, MIDDLEWARES_SECTION,
    REGISTRIES_SECTION, STORAGE_SECTION,
};
use crate::value::Value;

/// Generic decoder over a [`LoadedView`].
///
/// The typed section accessors are an optional capability: the defaults
/// return [`ConfigError::NotImplemented`], which tells
/// [`crate::StructuredConfig`] to fall back to a generic decode of the
/// section's path.
pub trait ConfigDecoder: Send + Sync + Debug {
    /// The view this decoder reads.
    fn view(&self) -> LoadedView;

    /// Clone of the sub-tree at `path`.
    fn lookup(&self, path: &str) -> ConfigResult<Value> {
        self.view().get(path).cloned()
    }

    /// Native accessor for the `app` section.
    fn app_info(&self) -> ConfigResult<AppInfoConfig> {
        Err(ConfigError::NotImplemented(APP_SECTION.to_string()))
    }

    /// Native accessor for the `logger` section.
    fn logger(&self) -> ConfigResult<LoggerConfig> {
        Err(ConfigError::NotImplemented(LOGGER_SECTION.to_string()))
    }

    /// Native accessor for the `registries` section.
    fn registries(&self) -> ConfigResult<RegistriesConfig> {
        Err(ConfigError::NotImplemented(REGISTRIES_SECTION.to_string()))
    }

    /// Native accessor for the `middlewares` section.
    fn middlewares(&self) -> ConfigResult<MiddlewaresConfig> {
        Err(ConfigError::NotImplemented(MIDDLEWARES_SECTION.to_string()))
    }

    /// Native accessor for the `storage` section.
    fn storage(&self) -> ConfigResult<StorageConfig> {
        Err(ConfigError::NotImplemented(STORAGE_SECTION.to_string()))
    }

    /// Native accessor for the `components` section.
    fn components(&self) -> ConfigResult<BTreeMap<String, ComponentConfig>> {
        Err(ConfigError::NotImplemented(COMPONENTS_SECTION.to_string()))
    }

    /// Release the underlying pipeline, if any.
    fn close(&self) {}
}

/// Generic decode entry points available on every [`ConfigDecoder`].
pub trait ConfigDecoderExt: ConfigDecoder {
    /// Decode the sub-tree at `path` into `T`.
    fn decode<T: DeserializeOwned>(&self, path: &str) -> ConfigResult<T> {
        let value = self.lookup(path)?;
        from_value(&value, path)
    }

    /// Decode the sub-tree at `path` into an existing slot.
    ///
    /// A `None` target fails with [`ConfigError::InvalidTarget`] before the
    /// view is touched.
    fn decode_into<T: DeserializeOwned>(&self, path: &str, target: Option<&mut T>) -> ConfigResult<()> {
        let target = target.ok_or(ConfigError::InvalidTarget)?;
        *target = self.decode(path)?;
        Ok(())
    }
}

impl<D: ConfigDecoder + ?Sized> ConfigDecoderExt for D {}

/// The plain decoder: answers every typed accessor with `NotImplemented`.
#[derive(Debug, Clone)]
pub struct ViewDecoder {
    view: LoadedView,
    pipeline: Option<Arc<SourcePipeline>>,
}

impl ViewDecoder {
    /// Decoder over a detached view.
    pub fn new(view: LoadedView) -> Self {
        Self {
            view,
            pipeline: None,
        }
    }

    /// Decoder over the pipeline's current view; `close` closes the pipeline.
    pub fn from_pipeline(pipeline: Arc<SourcePipeline>) -> Self {
        Self {
            view: pipeline.current(),
            pipeline: Some(pipeline),
        }
    }
}

impl ConfigDecoder for ViewDecoder {
    fn view(&self) -> LoadedView {
        self.view.clone()
    }

    fn close(&self) {
        if let Some(pipeline) = &self.pipeline {
            pipeline.close();
        }
    }
}

/// Fast-path decoder that decodes each well-known section once and serves
/// later calls from the cache.
///
/// A section whose path is not configured is declined with
/// `NotImplemented`, leaving the decision to the caller.
#[derive(Debug)]
pub struct SectionCache {
    inner: ViewDecoder,
    paths: BTreeMap<String, String>,
    app: OnceCell<ConfigResult<AppInfoConfig>>,
    logger: OnceCell<ConfigResult<LoggerConfig>>,
    registries: OnceCell<ConfigResult<RegistriesConfig>>,
    middlewares: OnceCell<ConfigResult<MiddlewaresConfig>>,
    storage: OnceCell<ConfigResult<StorageConfig>>,
    components: OnceCell<ConfigResult<BTreeMap<String, ComponentConfig>>>,
}

impl SectionCache {
    /// Wrap `inner`, reading each section from its entry in `paths`.
    pub fn new(inner: ViewDecoder, paths: BTreeMap<String, String>) -> Self {
        Self {
            inner,
            paths,
            app: OnceCell::new(),
            logger: OnceCell::new(),
            registries: OnceCell::new(),
            middlewares: OnceCell::new(),
            storage: OnceCell::new(),
            components: OnceCell::new(),
        }
    }

    fn cached<T>(&self, cell: &OnceCell<ConfigResult<T>>, section: &str) -> ConfigResult<T>
    where
        T: DeserializeOwned + Clone,
    {
        cell.get_or_init(|| match self.paths.get(section).filter(|p| !p.is_empty()) {
            Some(path) => self.inner.decode(path),
            None => Err(ConfigError::NotImplemented(section.to_string())),
        })
        .clone()
    }
}

impl ConfigDecoder for SectionCache {
    fn view(&self) -> LoadedView {
        self.inner.view()
    }

    fn app_info(&self) -> ConfigResult<AppInfoConfig> {
        self.cached(&self.app, APP_SECTION)
    }

    fn logger(&self) -> ConfigResult<LoggerConfig> {
        self.cached(&self.logger, LOGGER_SECTION)
    }

    fn registries(&self) -> ConfigResult<RegistriesConfig> {
        self.cached(&self.registries, REGISTRIES_SECTION)
    }

    fn middlewares(&self) -> ConfigResult<MiddlewaresConfig> {
        self.cached(&self.middlewares, MIDDLEWARES_SECTION)
    }

    fn storage(&self) -> ConfigResult<StorageConfig> {
        self.cached(&self.storage, STORAGE_SECTION)
    }

    fn components(&self) -> ConfigResult<BTreeMap<String, ComponentConfig>> {
        self.cached(&self.components, COMPONENTS_SECTION)
    }

    fn close(&self) {
        self.inner.close();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{DateTime, Utc};
    use serde::Deserialize;

    use super::*;
    use crate::format::Format;
    use crate::sections::LogLevel;
    use crate::ErrorKind;

    fn view(yaml: &str) -> LoadedView {
        LoadedView::new(Format::Yaml.decode(yaml.as_bytes()).unwrap().unwrap())
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Server {
        port: u16,
        #[serde(with = "crate::de::duration")]
        timeout: Duration,
        started: DateTime<Utc>,
        #[serde(with = "crate::de::from_str")]
        addr: std::net::IpAddr,
        tags: Vec<String>,
    }

    #[test]
    fn test_decode_with_conversions() {
        let decoder = ViewDecoder::new(view(
            "server:\n  port: \"8080\"\n  timeout: 1m 30s\n  started: 2024-05-01T10:00:00Z\n  addr: 10.0.0.1\n  tags: solo",
        ));
        let server: Server = decoder.decode("server").unwrap();
        assert_eq!(server.port, 8080);
        assert_eq!(server.timeout, Duration::from_secs(90));
        assert_eq!(server.started.to_rfc3339(), "2024-05-01T10:00:00+00:00");
        assert_eq!(server.addr.to_string(), "10.0.0.1");
        assert_eq!(server.tags, vec!["solo"]);
    }

    #[test]
    fn test_decode_errors_keep_their_kind() {
        let decoder = ViewDecoder::new(view("a: {b: 1}\nlist: [1]\nport: abc"));
        assert_eq!(
            decoder.decode::<Value>("a.c").unwrap_err().kind(),
            ErrorKind::KeyNotFound
        );
        assert_eq!(
            decoder.decode::<Value>("list.x").unwrap_err().kind(),
            ErrorKind::PathNotMap
        );
        match decoder.decode::<u16>("port").unwrap_err() {
            ConfigError::DecodeMismatch { path, kind, .. } => {
                assert_eq!(path, "port");
                assert_eq!(kind, "string");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decode_into_requires_target() {
        let decoder = ViewDecoder::new(view("n: 3"));
        let err = decoder.decode_into::<i64>("n", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTarget);

        let mut n = 0i64;
        decoder.decode_into("n", Some(&mut n)).unwrap();
        assert_eq!(n, 3);
    }

    #[test]
    fn test_view_decoder_declines_fast_paths() {
        let decoder = ViewDecoder::new(view("logger: {level: debug}"));
        assert_eq!(decoder.logger().unwrap_err().kind(), ErrorKind::NotImplemented);
    }

    #[test]
    fn test_section_cache_matches_generic_decode() {
        let paths = BTreeMap::from([
            (LOGGER_SECTION.to_string(), "observability.logger".to_string()),
            (APP_SECTION.to_string(), String::new()),
        ]);
        let cache = SectionCache::new(
            ViewDecoder::new(view("observability:\n  logger: {level: debug, format: json}")),
            paths,
        );

        let fast = cache.logger().unwrap();
        let generic: LoggerConfig = cache.decode("observability.logger").unwrap();
        assert_eq!(fast, generic);
        assert_eq!(fast.level, LogLevel::Debug);

        assert_eq!(cache.app_info().unwrap_err().kind(), ErrorKind::NotImplemented);
        assert_eq!(cache.storage().unwrap_err().kind(), ErrorKind::NotImplemented);
    }
}

//! The bootstrap orchestrator.
//!
//! [`load`] turns a bootstrap file and [`Options`] into an [`AppInfo`], a
//! frozen [`Container`], the [`StructuredConfig`] and a [`Cleanup`]. The
//! build is sequential:
//!
//! 1. read and validate the bootstrap file
//! 2. build and load the source pipeline
//! 3. wrap the view in a structured config
//! 4. apply the caller's transformer
//! 5. resolve the application identity
//! 6. logger
//! 7. discoveries and registrars
//! 8. middlewares
//! 9. storage
//! 10. user components
//!
//! Failures in steps 1, 2, 4, 5 and an unresolved default registrar abort
//! the bootstrap after releasing whatever was acquired. Every other failure
//! is logged and leaves the affected component out of the container.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::app::AppInfo;
use crate::cleanup::Cleanup;
use crate::component::{Component, NoopStorageProvider, StorageProvider};
use crate::container::Container;
use crate::de::from_value;
use crate::decoder::{ConfigDecoder, SectionCache, ViewDecoder};
use crate::error::{BootstrapError, BootstrapResult, ConfigError, ConfigResult};
use crate::factory::{Factories, DEFAULT_STORAGE};
use crate::format::decode_any_document;
use crate::logger::Logger;
use crate::options::{Options, OPTIONS_ENV_SOURCE};
use crate::pipeline::SourcePipeline;
use crate::sections::{MiddlewareConfig, RegistriesConfig};
use crate::source::{FileSource, Source, SourceConfig, SourceContext};
use crate::structured::{default_paths, StructuredConfig};
use crate::value::Value;

/// Name of the private source that reads the bootstrap file.
const BOOTSTRAP_SOURCE: &str = "bootstrap";

/// The parsed bootstrap file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bootstrap {
    /// Sources in declaration order
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    /// Section path overrides
    #[serde(default)]
    pub paths: BTreeMap<String, String>,
}

impl Bootstrap {
    /// Parse a bootstrap document; JSON, YAML and TOML are tried in turn.
    pub fn parse(bytes: &[u8]) -> ConfigResult<Self> {
        let (format, doc) = decode_any_document(bytes)?;
        debug!(format = %format, "bootstrap document decoded");
        let bootstrap: Bootstrap = from_value(&Value::Map(doc), "")
            .map_err(|err| ConfigError::ConfigInvalid(format!("bootstrap: {err}")))?;
        bootstrap.validate()?;
        Ok(bootstrap)
    }

    /// Read and parse the bootstrap file at `path`.
    pub fn read(path: &Path) -> ConfigResult<Self> {
        let source = FileSource::new(BOOTSTRAP_SOURCE, path);
        let records = source.load();
        // A plain file source holds no watcher until asked for one.
        let _ = source.close();

        let mut records = records?;
        if records.len() != 1 {
            return Err(ConfigError::ConfigInvalid(format!(
                "bootstrap path {} must name a single file, found {} entries",
                path.display(),
                records.len()
            )));
        }
        let record = records.remove(0);
        Self::parse(&record.value)
    }

    /// At least one source; every entry named and typed; names unique.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.sources.is_empty() {
            return Err(ConfigError::ConfigInvalid(
                "bootstrap declares no sources".to_string(),
            ));
        }
        let mut seen = BTreeSet::new();
        for source in &self.sources {
            source.validate()?;
            if !seen.insert(source.name.as_str()) {
                return Err(ConfigError::ConfigInvalid(format!(
                    "duplicate source name '{}'",
                    source.name
                )));
            }
        }
        Ok(())
    }
}

/// Everything [`load`] produces.
#[derive(Debug)]
pub struct Bootstrapped {
    app_info: AppInfo,
    container: Arc<Container>,
    config: StructuredConfig,
    pipeline: Arc<SourcePipeline>,
    cleanup: Cleanup,
}

impl Bootstrapped {
    /// The resolved application identity.
    pub fn app_info(&self) -> &AppInfo {
        &self.app_info
    }

    /// The frozen container.
    pub fn container(&self) -> Arc<Container> {
        Arc::clone(&self.container)
    }

    /// The structured configuration.
    pub fn config(&self) -> &StructuredConfig {
        &self.config
    }

    /// The source pipeline, for watching.
    pub fn pipeline(&self) -> Arc<SourcePipeline> {
        Arc::clone(&self.pipeline)
    }

    /// Handle releasing everything in reverse acquisition order.
    pub fn cleanup(&self) -> Cleanup {
        self.cleanup.clone()
    }
}

/// Bootstrap the application described by the file at `path`.
///
/// Blocks until the container is assembled. Must not be called from a
/// context that forbids blocking file I/O.
pub fn load(path: impl AsRef<Path>, options: Options) -> BootstrapResult<Bootstrapped> {
    let path = path.as_ref();
    let factories = options.factories();
    let cleanup = Cleanup::new();

    // 1. bootstrap file
    let mut bootstrap = Bootstrap::read(path)?;
    if !options.env_prefixes().is_empty() {
        bootstrap.sources.push(
            SourceConfig::env(OPTIONS_ENV_SOURCE, options.env_prefixes().iter().cloned())
                .with_priority(i64::MAX),
        );
        // The appended source takes part in the name uniqueness check.
        bootstrap.validate()?;
    }
    let sources = &bootstrap.sources;
    info!(path = %path.display(), sources = sources.len(), "bootstrapping");

    // 2. pipeline
    let ctx = SourceContext::new(path.parent().unwrap_or_else(|| Path::new("")));
    let pipeline = Arc::new(SourcePipeline::build(sources, &factories.sources, &ctx)?);
    {
        let pipeline = Arc::clone(&pipeline);
        cleanup.push("pipeline", move || {
            pipeline.close();
            Ok(())
        });
    }
    if let Err(err) = pipeline.load() {
        return Err(abort(&cleanup, err.into()));
    }

    // 3. structured config
    let mut paths = default_paths();
    paths.extend(bootstrap.paths.clone());
    paths.extend(options.paths().clone());
    let view_decoder = ViewDecoder::from_pipeline(Arc::clone(&pipeline));
    let decoder: Arc<dyn ConfigDecoder> = if options.fast_path() {
        Arc::new(SectionCache::new(view_decoder, paths.clone()))
    } else {
        Arc::new(view_decoder)
    };
    let mut config = StructuredConfig::new(decoder, &paths);

    // 4. transformer
    if let Some(transform) = options.transformer() {
        match transform(&config) {
            Ok(transformed) => config = transformed,
            Err(err) => return Err(abort(&cleanup, BootstrapError::Transform(err.to_string()))),
        }
    }

    // 5. identity
    let app_info = match resolve_app_info(&config, options.app_info()) {
        Ok(app_info) => app_info,
        Err(err) => return Err(abort(&cleanup, err)),
    };

    // 6. logger
    let logger = init_logger(&config);
    if options.global_logger() && !logger.install_global() {
        debug!("a global logger is already installed; keeping this one local");
    }
    {
        let logger = logger.clone();
        cleanup.push("logger", move || logger.sync().map_err(Into::into));
    }

    let mut container = Container::new(logger.clone());
    let built: BootstrapResult<()> = logger.in_scope(|| {
        info!(id = %app_info.id, name = %app_info.name, version = %app_info.version, "application identified");

        // 7. registries
        init_registries(&config, &factories, &mut container, &cleanup)?;
        // 8. middlewares
        init_middlewares(&config, &factories, &mut container, &cleanup);
        // 9. storage
        init_storage(&config, &factories, &mut container, &cleanup);
        // 10. user components
        init_components(&config, &factories, &mut container, &cleanup);
        Ok(())
    });
    if let Err(err) = built {
        return Err(logger.in_scope(|| abort(&cleanup, err)));
    }

    logger.in_scope(|| {
        info!(
            discoveries = container.discoveries().len(),
            server_middlewares = container.server_middlewares().len(),
            client_middlewares = container.client_middlewares().len(),
            components = container.components().len(),
            "bootstrap complete"
        )
    });
    Ok(Bootstrapped {
        app_info,
        container: Arc::new(container),
        config,
        pipeline,
        cleanup,
    })
}

fn abort(cleanup: &Cleanup, err: BootstrapError) -> BootstrapError {
    warn!(error = %err, kind = %err.kind(), "bootstrap failed; releasing acquired resources");
    cleanup.run();
    err
}

fn resolve_app_info(config: &StructuredConfig, caller: Option<&AppInfo>) -> BootstrapResult<AppInfo> {
    let base = caller.cloned().unwrap_or_default();
    let app_info = match config.app_info() {
        Ok(section) => base.overlay(&section),
        Err(err) if err.is_absent() => base,
        Err(err) => return Err(err.into()),
    };
    let missing = app_info.missing_fields();
    if !missing.is_empty() {
        return Err(BootstrapError::MissingAppInfo(missing));
    }
    Ok(app_info)
}

fn init_logger(config: &StructuredConfig) -> Logger {
    match config.logger() {
        Ok(section) => match Logger::from_config(&section) {
            Ok(logger) => logger,
            Err(err) => {
                let logger = Logger::default();
                logger.in_scope(|| warn!(error = %err, "logger build failed; using default logger"));
                logger
            }
        },
        Err(err) if err.is_absent() => {
            let logger = Logger::default();
            logger.in_scope(|| debug!("no logger section; using default logger"));
            logger
        }
        Err(err) => {
            let logger = Logger::default();
            logger.in_scope(|| warn!(error = %err, "logger section invalid; using default logger"));
            logger
        }
    }
}

fn init_registries(
    config: &StructuredConfig,
    factories: &Factories,
    container: &mut Container,
    cleanup: &Cleanup,
) -> BootstrapResult<()> {
    let section = match config.registries() {
        Ok(section) => section,
        Err(err) if err.is_absent() => {
            info!("no registries configured; running in local mode");
            RegistriesConfig::default()
        }
        Err(err) => {
            warn!(error = %err, "registries section invalid; running in local mode");
            RegistriesConfig::default()
        }
    };

    for (name, discovery) in &section.discoveries {
        if !discovery.is_enabled() {
            debug!(registry = %name, "registry disabled");
            continue;
        }
        let factory = match factories.registries.get(&discovery.kind) {
            Ok(factory) => factory,
            Err(err) => {
                warn!(registry = %name, error = %err, "registry skipped");
                continue;
            }
        };
        match factory.build(name, discovery) {
            Ok((reader, writer)) => {
                container.insert_registry(name, Arc::clone(&reader), Arc::clone(&writer));
                cleanup.push(format!("registry:{name}"), move || {
                    writer.close()?;
                    reader.close()?;
                    Ok(())
                });
                info!(registry = %name, kind = %discovery.kind, "registry ready");
            }
            Err(err) => warn!(registry = %name, kind = %discovery.kind, error = %err, "registry skipped"),
        }
    }

    if !section.default.is_empty() {
        let registrar = container
            .registrar(&section.default)
            .ok_or_else(|| BootstrapError::DefaultRegistrarMissing(section.default.clone()))?;
        container.set_default_registrar(registrar);
    }
    Ok(())
}

fn init_middlewares(
    config: &StructuredConfig,
    factories: &Factories,
    container: &mut Container,
    cleanup: &Cleanup,
) {
    let section = match config.middlewares() {
        Ok(section) => section,
        Err(err) if err.is_absent() => {
            debug!("no middlewares configured");
            return;
        }
        Err(err) => {
            warn!(error = %err, "middlewares section invalid; no middleware built");
            return;
        }
    };

    for entry in section.enabled() {
        if let Err(err) = init_middleware(entry, factories, container, cleanup) {
            warn!(middleware = %entry.kind, error = %err, "middleware skipped");
        }
    }
}

fn init_middleware(
    entry: &MiddlewareConfig,
    factories: &Factories,
    container: &mut Container,
    cleanup: &Cleanup,
) -> Result<(), String> {
    let factory = factories
        .middlewares
        .get(&entry.kind)
        .map_err(|err| err.to_string())?;
    let server = factory.build_server(entry).map_err(|err| err.to_string())?;
    let client = match factory.build_client(entry) {
        Ok(client) => client,
        Err(err) => {
            if let Some(server) = server {
                let _ = server.close();
            }
            return Err(err.to_string());
        }
    };

    if let Some(server) = &server {
        container.insert_server_middleware(&entry.kind, Arc::clone(server));
    }
    if let Some(client) = &client {
        container.insert_client_middleware(&entry.kind, Arc::clone(client));
    }
    debug!(
        middleware = %entry.kind,
        server = server.is_some(),
        client = client.is_some(),
        "middleware ready"
    );
    cleanup.push(format!("middleware:{}", entry.kind), move || {
        for mw in server.iter().chain(client.iter()) {
            mw.close()?;
        }
        Ok(())
    });
    Ok(())
}

fn init_storage(
    config: &StructuredConfig,
    factories: &Factories,
    container: &mut Container,
    cleanup: &Cleanup,
) {
    let provider: Arc<dyn StorageProvider> = match config.storage() {
        Ok(section) => {
            let tag = if section.kind.is_empty() {
                DEFAULT_STORAGE
            } else {
                section.kind.as_str()
            };
            match factories
                .storage
                .get(tag)
                .map_err(|err| err.to_string())
                .and_then(|factory| factory.build(&section).map_err(|err| err.to_string()))
            {
                Ok(provider) => {
                    info!(storage = %tag, "storage ready");
                    provider
                }
                Err(err) => {
                    warn!(storage = %tag, error = %err, "storage unavailable; using no-op provider");
                    Arc::new(NoopStorageProvider)
                }
            }
        }
        Err(err) if err.is_absent() => Arc::new(NoopStorageProvider),
        Err(err) => {
            warn!(error = %err, "storage section invalid; using no-op provider");
            Arc::new(NoopStorageProvider)
        }
    };

    container.set_storage(Arc::clone(&provider));
    cleanup.push("storage", move || provider.close().map_err(Into::into));
}

fn init_components(
    config: &StructuredConfig,
    factories: &Factories,
    container: &mut Container,
    cleanup: &Cleanup,
) {
    for (name, factory) in factories.components.iter() {
        match factory.build(config, container) {
            Ok(built) => {
                container.insert_component(name, built.component);
                if let Some(release) = built.release {
                    cleanup.push(format!("component:{name}"), release);
                }
                debug!(component = %name, "component ready");
            }
            Err(err) => warn!(component = %name, error = %err, "component skipped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_parse_each_format() {
        let yaml = b"sources:\n  - {name: base, type: file, file: {path: app.yaml}}\n";
        let json = br#"{"sources": [{"name": "base", "type": "file", "file": {"path": "app.yaml"}}]}"#;
        let toml = b"[[sources]]\nname = \"base\"\ntype = \"file\"\n[sources.file]\npath = \"app.yaml\"\n";
        for doc in [&yaml[..], &json[..], &toml[..]] {
            let bootstrap = Bootstrap::parse(doc).unwrap();
            assert_eq!(bootstrap.sources.len(), 1);
            assert_eq!(bootstrap.sources[0].file.as_ref().unwrap().path, "app.yaml");
            assert_eq!(bootstrap.sources[0].priority, 0);
        }
    }

    #[test]
    fn test_validation() {
        let empty = Bootstrap::parse(b"sources: []").unwrap_err();
        assert_eq!(empty.kind(), ErrorKind::ConfigInvalid);

        let unnamed = Bootstrap::parse(b"sources:\n  - {type: env}").unwrap_err();
        assert_eq!(unnamed.kind(), ErrorKind::ConfigInvalid);

        let duplicate = Bootstrap::parse(
            b"sources:\n  - {name: a, type: env}\n  - {name: a, type: env, priority: 3}",
        )
        .unwrap_err();
        assert!(duplicate.to_string().contains("duplicate source name 'a'"));
    }

    #[test]
    fn test_path_overrides_are_parsed() {
        let bootstrap =
            Bootstrap::parse(b"sources:\n  - {name: e, type: env}\npaths: {logger: obs.logger}")
                .unwrap();
        assert_eq!(bootstrap.paths["logger"], "obs.logger");
    }

    #[test]
    fn test_read_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.yaml"), "sources: []").unwrap();
        std::fs::write(dir.path().join("b.yaml"), "sources: []").unwrap();
        let err = Bootstrap::read(dir.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);

        let missing = Bootstrap::read(&dir.path().join("missing.yaml")).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::SourceLoadError);
    }
}

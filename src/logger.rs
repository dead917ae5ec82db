//! The logger component.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use once_cell::sync::OnceCell;
use tracing::{debug, Dispatch};
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::EnvFilter;

use crate::error::{ComponentError, ComponentResult};
use crate::sections::{LogFormat, LogLevel, LoggerConfig};

static GLOBAL_LOGGER: OnceCell<()> = OnceCell::new();

/// A configured `tracing` dispatcher plus the settings it was built from.
#[derive(Clone)]
pub struct Logger {
    config: LoggerConfig,
    dispatch: Dispatch,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("level", &self.config.level)
            .field("format", &self.config.format)
            .field("stdout", &self.config.stdout)
            .field("file", &self.file_path())
            .finish()
    }
}

impl Logger {
    /// Build a logger from its section.
    ///
    /// Fails only if the log file cannot be opened.
    pub fn from_config(config: &LoggerConfig) -> ComponentResult<Self> {
        let writer = make_writer(config)?;
        let filter = EnvFilter::try_new(config.level.as_str())
            .map_err(|err| ComponentError::Configuration(err.to_string()))?;

        let builder = fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .with_writer(writer);

        let dispatch = match config.format {
            LogFormat::Json => Dispatch::new(builder.json().flatten_event(true).finish()),
            LogFormat::Text => Dispatch::new(builder.with_ansi(false).finish()),
        };

        let logger = Self {
            config: config.clone(),
            dispatch,
        };
        if let Some(file) = config.file.as_ref().filter(|f| !f.path.is_empty()) {
            logger.in_scope(|| {
                debug!(
                    path = %file.path,
                    max_size = file.max_size,
                    max_age = file.max_age,
                    max_backups = file.max_backups,
                    local_time = file.local_time,
                    compress = file.compress,
                    "log file opened; rotation is left to external tooling"
                )
            });
        }
        Ok(logger)
    }

    /// Minimum emitted level.
    pub fn level(&self) -> LogLevel {
        self.config.level
    }

    /// Line encoding.
    pub fn format(&self) -> LogFormat {
        self.config.format
    }

    /// The settings the logger was built from.
    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    /// Path of the file sink, if any.
    pub fn file_path(&self) -> Option<&Path> {
        self.config
            .file
            .as_ref()
            .map(|f| Path::new(f.path.as_str()))
            .filter(|p| !p.as_os_str().is_empty())
    }

    /// True if events at `level` reach the sinks.
    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.config.level
    }

    /// The underlying dispatcher.
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Run `f` with this logger as the thread's default.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    /// Install as the process-wide default.
    ///
    /// Only the first successful call in the process installs anything;
    /// returns whether this call did.
    pub fn install_global(&self) -> bool {
        let mut installed = false;
        let _ = GLOBAL_LOGGER.get_or_try_init(|| {
            tracing::dispatcher::set_global_default(self.dispatch.clone()).map(|_| {
                installed = true;
            })
        });
        installed
    }

    /// Flush the file sink. Writers are unbuffered, so only the OS buffer
    /// is involved.
    pub fn sync(&self) -> io::Result<()> {
        match self.file_path() {
            Some(path) => OpenOptions::new().append(true).open(path)?.sync_all(),
            None => Ok(()),
        }
    }
}

impl Default for Logger {
    fn default() -> Self {
        let dispatch = Dispatch::new(
            fmt::Subscriber::builder()
                .with_env_filter(EnvFilter::new(LogLevel::Info.as_str()))
                .with_ansi(false)
                .with_writer(io::stdout)
                .finish(),
        );
        Self {
            config: LoggerConfig::default(),
            dispatch,
        }
    }
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn make_writer(config: &LoggerConfig) -> ComponentResult<BoxMakeWriter> {
    let file = match config.file.as_ref().filter(|f| !f.path.is_empty()) {
        Some(file) => {
            let path = PathBuf::from(&file.path);
            let handle = open_log_file(&path).map_err(|err| {
                ComponentError::Io(format!("cannot open log file {}: {err}", path.display()))
            })?;
            Some(Mutex::new(handle))
        }
        None => None,
    };

    Ok(match (config.stdout, file) {
        (true, Some(file)) => BoxMakeWriter::new(io::stdout.and(file)),
        (true, None) => BoxMakeWriter::new(io::stdout),
        (false, Some(file)) => BoxMakeWriter::new(file),
        (false, None) => BoxMakeWriter::new(io::sink),
    })
}

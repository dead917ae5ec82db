//! File and directory source with change notification.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use notify::event::{EventKind, ModifyKind};
use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::{ChangeEvent, KeyValue, NoopWatcher, Source, StopSignal, Watcher};
use crate::error::{ConfigError, ConfigResult};
use crate::format::Format;

/// Depth to which directories are walked.
pub const MAX_WALK_DEPTH: usize = 4;

const IGNORED_SUFFIXES: &[&str] = &[
    ".swp", ".swo", ".swx", ".tmp", ".bak", ".orig", ".rej", "~", ".crdownload", ".part",
];
const IGNORED_NAMES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini", "4913"];

/// True for editor swap files, OS metadata and backup files.
pub(crate) fn is_ignored(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return true;
    };
    IGNORED_NAMES.contains(&name)
        || name.starts_with(".#")
        || IGNORED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn read_record(source: &str, path: &Path) -> ConfigResult<KeyValue> {
    let bytes = fs::read(path)
        .map_err(|e| ConfigError::source_load(source, format!("{}: {e}", path.display())))?;
    Ok(KeyValue::new(base_name(path), Format::from_path(path), bytes))
}

fn walk(source: &str, dir: &Path, depth: usize, out: &mut Vec<PathBuf>) -> ConfigResult<()> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| ConfigError::source_load(source, format!("{}: {e}", dir.display())))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    for path in entries {
        if path.is_dir() {
            if depth + 1 < MAX_WALK_DEPTH {
                walk(source, &path, depth + 1, out)?;
            } else {
                trace!(source, path = %path.display(), "directory below walk depth skipped");
            }
        } else if is_ignored(&path) {
            trace!(source, path = %path.display(), "ignored file skipped");
        } else {
            out.push(path);
        }
    }
    Ok(())
}

/// A source reading one file, or every file of a directory tree.
///
/// Each file becomes one [`KeyValue`] keyed by its base name, with the
/// format inferred from the extension.
#[derive(Debug)]
pub struct FileSource {
    name: String,
    path: PathBuf,
    optional: bool,
    closed: AtomicBool,
    watchers: Mutex<Vec<Arc<FileWatcher>>>,
}

impl FileSource {
    /// Create a source for `path`.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            optional: false,
            closed: AtomicBool::new(false),
            watchers: Mutex::new(Vec::new()),
        }
    }

    /// Treat a missing path as empty instead of failing.
    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// The watched path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn missing(&self) -> bool {
        !self.path.exists()
    }

    /// Files the source currently contributes, in deterministic order.
    fn files(&self) -> ConfigResult<Vec<PathBuf>> {
        if self.path.is_dir() {
            let mut out = Vec::new();
            walk(&self.name, &self.path, 0, &mut out)?;
            Ok(out)
        } else {
            Ok(vec![self.path.clone()])
        }
    }
}

impl Source for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> ConfigResult<Vec<KeyValue>> {
        if self.missing() {
            if self.optional {
                debug!(source = %self.name, path = %self.path.display(), "optional path missing");
                return Ok(Vec::new());
            }
            return Err(ConfigError::source_load(
                &self.name,
                format!("{} does not exist", self.path.display()),
            ));
        }
        self.files()?
            .iter()
            .map(|path| read_record(&self.name, path))
            .collect()
    }

    fn watch(&self) -> ConfigResult<Box<dyn Watcher>> {
        if self.optional && self.missing() {
            return Ok(Box::new(NoopWatcher::new()));
        }
        let watcher = Arc::new(FileWatcher::start(&self.name, &self.path)?);
        self.watchers.lock().push(Arc::clone(&watcher));
        Ok(Box::new(SharedFileWatcher(watcher)))
    }

    fn close(&self) -> ConfigResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        for watcher in self.watchers.lock().drain(..) {
            watcher.stop();
        }
        debug!(source = %self.name, "file source closed");
        Ok(())
    }
}

/// Watches a file or directory through the platform notification API.
///
/// A single file is watched through its parent directory and events are
/// filtered by file name, so the watch survives the file being replaced
/// by rename (editors and config management tools write a temporary file
/// and move it over the target).
pub struct FileWatcher {
    source: String,
    path: PathBuf,
    /// Path handed to the notification API.
    watched: PathBuf,
    recursive: RecursiveMode,
    /// File name events must carry when watching a single file.
    target: Option<OsString>,
    inner: Mutex<Option<RecommendedWatcher>>,
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<notify::Result<notify::Event>>>,
    stop: StopSignal,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("source", &self.source)
            .field("path", &self.path)
            .field("watched", &self.watched)
            .field("stopped", &self.stop.is_stopped())
            .finish()
    }
}

impl FileWatcher {
    /// Subscribe to changes of `path`.
    pub fn start(source: &str, path: &Path) -> ConfigResult<Self> {
        let (watched, recursive, target) = if path.is_dir() {
            (path.to_path_buf(), RecursiveMode::Recursive, None)
        } else {
            let name = path.file_name().ok_or_else(|| {
                ConfigError::ConfigInvalid(format!("{} does not name a file", path.display()))
            })?;
            let parent = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            (parent, RecursiveMode::NonRecursive, Some(name.to_os_string()))
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = notify::recommended_watcher(move |event| {
            // The receiver is gone once the watcher stops; late events are dropped.
            let _ = tx.send(event);
        })?;
        inner.watch(&watched, recursive)?;
        debug!(source, path = %path.display(), watched = %watched.display(), "watching for changes");

        Ok(Self {
            source: source.to_string(),
            path: path.to_path_buf(),
            watched,
            recursive,
            target,
            inner: Mutex::new(Some(inner)),
            events: tokio::sync::Mutex::new(rx),
            stop: StopSignal::new(),
        })
    }

    /// True when `path` is something this watcher reports.
    fn is_relevant(&self, path: &Path) -> bool {
        if is_ignored(path) {
            return false;
        }
        match &self.target {
            Some(name) => path.file_name() == Some(name.as_os_str()),
            None => true,
        }
    }

    /// Re-subscribe after the watched directory itself was renamed or replaced.
    fn resubscribe(&self) {
        let mut guard = self.inner.lock();
        let Some(inner) = guard.as_mut() else {
            return;
        };
        let _ = inner.unwatch(&self.watched);
        if !self.watched.exists() {
            debug!(source = %self.source, path = %self.watched.display(), "watched directory gone; waiting for it to reappear");
            return;
        }
        if let Err(err) = inner.watch(&self.watched, self.recursive) {
            warn!(source = %self.source, path = %self.watched.display(), error = %err, "re-subscribe failed");
        }
    }

    fn to_change(&self, event: notify::Event) -> Option<ChangeEvent> {
        if matches!(event.kind, EventKind::Access(_)) {
            return None;
        }
        if matches!(event.kind, EventKind::Modify(ModifyKind::Name(_)) | EventKind::Remove(_))
            && event.paths.iter().any(|p| p == &self.watched)
        {
            self.resubscribe();
        }

        let mut changed_keys = Vec::new();
        let mut values = Vec::new();
        for path in event.paths.iter().filter(|p| self.is_relevant(p)) {
            changed_keys.push(base_name(path));
            if path.is_file() {
                match read_record(&self.source, path) {
                    Ok(record) => values.push(record),
                    Err(err) => warn!(source = %self.source, error = %err, "changed file unreadable"),
                }
            }
        }
        if changed_keys.is_empty() {
            return None;
        }
        changed_keys.sort();
        changed_keys.dedup();
        Some(ChangeEvent {
            source: self.source.clone(),
            changed_keys,
            values,
        })
    }

    /// Wait for the next relevant change.
    pub async fn next_change(&self) -> ConfigResult<Option<ChangeEvent>> {
        let mut events = self.events.lock().await;
        loop {
            if self.stop.is_stopped() {
                return Ok(None);
            }
            tokio::select! {
                _ = self.stop.stopped() => return Ok(None),
                received = events.recv() => match received {
                    None => return Ok(None),
                    Some(Err(err)) => return Err(err.into()),
                    Some(Ok(event)) => {
                        if let Some(change) = self.to_change(event) {
                            return Ok(Some(change));
                        }
                    }
                },
            }
        }
    }

    /// Stop watching and release the notification handle.
    pub fn stop(&self) {
        self.stop.stop();
        self.inner.lock().take();
    }
}

/// Handle given to the pipeline; the source keeps another so `close` can stop it.
struct SharedFileWatcher(Arc<FileWatcher>);

#[async_trait]
impl Watcher for SharedFileWatcher {
    async fn next(&self) -> ConfigResult<Option<ChangeEvent>> {
        self.0.next_change().await
    }

    fn stop(&self) {
        self.0.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignore_set() {
        assert!(is_ignored(Path::new("conf/.app.yaml.swp")));
        assert!(is_ignored(Path::new("conf/app.yaml~")));
        assert!(is_ignored(Path::new("conf/.DS_Store")));
        assert!(is_ignored(Path::new("conf/app.yaml.bak")));
        assert!(!is_ignored(Path::new("conf/app.yaml")));
    }

    #[test]
    fn test_load_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.yaml");
        fs::write(&path, "app:\n  id: svc\n").unwrap();

        let source = FileSource::new("main", &path);
        let records = source.load().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, "app.yaml");
        assert_eq!(records[0].format, Format::Yaml);
    }

    #[test]
    fn test_load_directory_skips_ignored_and_limits_depth() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.json"), "{}").unwrap();
        fs::write(dir.path().join("a.toml"), "").unwrap();
        fs::write(dir.path().join("a.toml.swp"), "junk").unwrap();
        fs::write(dir.path().join("notes.txt"), "raw").unwrap();

        let mut deep = dir.path().to_path_buf();
        for level in 0..MAX_WALK_DEPTH {
            deep = deep.join(format!("d{level}"));
            fs::create_dir(&deep).unwrap();
            fs::write(deep.join(format!("l{level}.yaml")), "x: 1").unwrap();
        }

        let records = FileSource::new("dir", dir.path()).load().unwrap();
        let keys: Vec<&str> = records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["a.toml", "b.json", "l2.yaml", "l1.yaml", "l0.yaml", "notes.txt"]
        );
        assert_eq!(records[5].format, Format::Raw);
    }

    #[test]
    fn test_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");

        let err = FileSource::new("req", &path).load().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::SourceLoadError);

        let optional = FileSource::new("opt", &path).optional(true);
        assert!(optional.load().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_optional_missing_watch_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSource::new("opt", dir.path().join("absent.yaml")).optional(true);
        let watcher = source.watch().unwrap();
        watcher.stop();
        assert_eq!(watcher.next().await.unwrap(), None);
    }

    async fn next_with_key(watcher: &dyn Watcher, key: &str) -> ChangeEvent {
        tokio::time::timeout(std::time::Duration::from_secs(10), async {
            loop {
                let change = watcher.next().await.unwrap().unwrap();
                if change.changed_keys.iter().any(|k| k == key) {
                    return change;
                }
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_watch_survives_replace_by_rename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.yaml");
        fs::write(&path, "level: info\n").unwrap();
        fs::write(dir.path().join("other.yaml"), "x: 1\n").unwrap();

        let source = FileSource::new("main", &path);
        let watcher = source.watch().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let staged = dir.path().join("app.yaml.new");
        fs::write(&staged, "level: warn\n").unwrap();
        fs::rename(&staged, &path).unwrap();
        let change = next_with_key(watcher.as_ref(), "app.yaml").await;
        assert_eq!(change.changed_keys, vec!["app.yaml"]);

        // The original inode is gone; edits to its replacement still arrive.
        fs::write(dir.path().join("other.yaml"), "x: 2\n").unwrap();
        fs::write(&path, "level: debug\n").unwrap();
        let change = tokio::time::timeout(std::time::Duration::from_secs(10), async {
            loop {
                let change = next_with_key(watcher.as_ref(), "app.yaml").await;
                if change.values.iter().any(|v| v.value == b"level: debug\n") {
                    return change;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(change.changed_keys, vec!["app.yaml"]);
        assert_eq!(change.values[0].key, "app.yaml");

        watcher.stop();
        source.close().unwrap();
    }

    #[tokio::test]
    async fn test_close_stops_watchers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.yaml");
        fs::write(&path, "a: 1\n").unwrap();

        let source = FileSource::new("main", &path);
        let watcher = source.watch().unwrap();
        source.close().unwrap();
        source.close().unwrap();

        let next = tokio::time::timeout(std::time::Duration::from_secs(5), watcher.next())
            .await
            .unwrap();
        assert_eq!(next.unwrap(), None);
    }
}

//! Priority-ordered merging of sources into an immutable [`LoadedView`].

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult, RegistryError};
use crate::format::{insert_env_entry, Format};
use crate::source::{
    ChangeEvent, KeyValue, Layout, Source, SourceConfig, SourceContext, SourceFactoryRegistry,
    Watcher,
};
use crate::stream::{EventSender, EventStream, StreamBuilder};
use crate::value::{split_path, Value};

/// The merged configuration tree. Cheap to clone; never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedView {
    root: Arc<Value>,
}

impl LoadedView {
    /// Wrap a tree.
    pub fn new(root: Value) -> Self {
        Self {
            root: Arc::new(root),
        }
    }

    /// The root node.
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Walk a dot-separated path; the empty path is the root.
    pub fn get(&self, path: &str) -> ConfigResult<&Value> {
        self.root.lookup(path)
    }

    /// True if `path` resolves.
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_ok()
    }

    /// Sorted-key JSON rendering of the whole tree.
    pub fn to_canonical_json(&self) -> String {
        self.root.to_canonical_json()
    }
}

impl Default for LoadedView {
    fn default() -> Self {
        Self::new(Value::empty_map())
    }
}

/// A source together with its bootstrap entry.
struct SourceEntry {
    config: SourceConfig,
    source: Arc<dyn Source>,
}

/// One contribution to the merge: a source's tree at its priority.
struct Contribution {
    priority: i64,
    tree: Value,
}

/// Emitted after a watch event produced a new view.
#[derive(Debug, Clone)]
pub struct ViewChange {
    /// The event that triggered the re-load
    pub event: ChangeEvent,
    /// The freshly merged view
    pub view: LoadedView,
}

type InvalidationCallback = Arc<dyn Fn(&LoadedView) + Send + Sync>;

/// The ordered set of sources and the merge policy over them.
pub struct SourcePipeline {
    entries: Vec<SourceEntry>,
    current: ArcSwap<LoadedView>,
    callbacks: Mutex<Vec<InvalidationCallback>>,
    closed: Mutex<bool>,
}

impl fmt::Debug for SourcePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourcePipeline")
            .field("sources", &self.names())
            .finish()
    }
}

impl SourcePipeline {
    /// Assemble a pipeline from already built sources, in declaration order.
    pub fn new(sources: Vec<(SourceConfig, Box<dyn Source>)>) -> Self {
        Self {
            entries: sources
                .into_iter()
                .map(|(config, source)| SourceEntry {
                    config,
                    source: Arc::from(source),
                })
                .collect(),
            current: ArcSwap::from_pointee(LoadedView::default()),
            callbacks: Mutex::new(Vec::new()),
            closed: Mutex::new(false),
        }
    }

    /// Build every source through `factories`.
    ///
    /// If any source fails to build, the ones already built are closed and
    /// the error is returned.
    pub fn build(
        configs: &[SourceConfig],
        factories: &SourceFactoryRegistry,
        ctx: &SourceContext,
    ) -> ConfigResult<Self> {
        let mut built: Vec<(SourceConfig, Box<dyn Source>)> = Vec::with_capacity(configs.len());
        for config in configs {
            let result = factories
                .get(&config.kind)
                .map_err(|err| match err {
                    RegistryError::FactoryNotFound(kind) => ConfigError::FactoryNotFound {
                        source_name: config.name.clone(),
                        kind,
                    },
                    other => ConfigError::ConfigInvalid(format!("source '{}': {other}", config.name)),
                })
                .and_then(|factory| factory.build(config, ctx));
            match result {
                Ok(source) => {
                    debug!(source = %config.name, kind = %config.kind, "source built");
                    built.push((config.clone(), source));
                }
                Err(err) => {
                    SourcePipeline::new(built).close();
                    return Err(err);
                }
            }
        }
        Ok(SourcePipeline::new(built))
    }

    /// Source names in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.config.name.as_str()).collect()
    }

    /// Number of sources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the pipeline has no sources.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recently loaded view.
    pub fn current(&self) -> LoadedView {
        self.current.load_full().as_ref().clone()
    }

    /// Load every source in declaration order and merge the results.
    pub fn load(&self) -> ConfigResult<LoadedView> {
        let mut contributions = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let records = entry.source.load().map_err(|err| match err {
                ConfigError::SourceLoad { .. } => err,
                other => ConfigError::source_load(&entry.config.name, other),
            })?;
            debug!(source = %entry.config.name, records = records.len(), "source loaded");
            contributions.push(Contribution {
                priority: entry.config.priority,
                tree: contribution(&entry.config.name, entry.source.layout(), &records)?,
            });
        }

        let view = LoadedView::new(merge(contributions));
        self.current.store(Arc::new(view.clone()));
        Ok(view)
    }

    /// Register a callback invoked with every view produced by a watch event.
    pub fn on_invalidate<F>(&self, callback: F)
    where
        F: Fn(&LoadedView) + Send + Sync + 'static,
    {
        self.callbacks.lock().push(Arc::new(callback));
    }

    fn publish(&self, view: &LoadedView) {
        let callbacks: Vec<InvalidationCallback> = self.callbacks.lock().clone();
        for callback in callbacks {
            callback(view);
        }
    }

    /// Start watching every source that supports it.
    ///
    /// Events from all sources are serialized into one stream; each event
    /// re-loads the pipeline and yields the new view. Must be called from
    /// within a tokio runtime.
    pub fn watch(self: &Arc<Self>) -> ConfigResult<PipelineWatch> {
        let (sender, stream) = StreamBuilder::<ViewChange>::new().buffer_size(16).build();
        let (event_tx, mut event_rx) = tokio::sync::mpsc::channel::<ChangeEvent>(16);

        let mut watchers: Vec<Arc<dyn Watcher>> = Vec::new();
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        for entry in &self.entries {
            let watcher: Arc<dyn Watcher> = match entry.source.watch() {
                Ok(watcher) => Arc::from(watcher),
                Err(ConfigError::WatchUnsupported(_)) => {
                    debug!(source = %entry.config.name, "source does not support watching");
                    continue;
                }
                Err(err) => {
                    for watcher in &watchers {
                        watcher.stop();
                    }
                    return Err(err);
                }
            };
            watchers.push(Arc::clone(&watcher));

            let event_tx = event_tx.clone();
            let name = entry.config.name.clone();
            tasks.push(tokio::spawn(async move {
                loop {
                    match watcher.next().await {
                        Ok(Some(event)) => {
                            if event_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(err) => {
                            warn!(source = %name, error = %err, "watch failed");
                            break;
                        }
                    }
                }
            }));
        }
        drop(event_tx);

        let pipeline = Arc::clone(self);
        tasks.push(tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                reload(&pipeline, event, &sender).await;
            }
        }));

        info!(watched = watchers.len(), "pipeline watch started");
        Ok(PipelineWatch {
            stream: Some(stream),
            watchers,
            tasks,
        })
    }

    /// Close every source in reverse order. Errors are logged, not returned.
    pub fn close(&self) {
        {
            let mut closed = self.closed.lock();
            if *closed {
                return;
            }
            *closed = true;
        }
        for entry in self.entries.iter().rev() {
            if let Err(err) = entry.source.close() {
                warn!(source = %entry.config.name, error = %err, "source close failed");
            }
        }
        debug!(sources = self.entries.len(), "pipeline closed");
    }
}

async fn reload(pipeline: &SourcePipeline, event: ChangeEvent, sender: &EventSender<ViewChange>) {
    debug!(source = %event.source, keys = ?event.changed_keys, "change received");
    match pipeline.load() {
        Ok(view) => {
            pipeline.publish(&view);
            // A dropped stream only means nobody listens for views.
            let _ = sender.send(ViewChange { event, view }).await;
        }
        Err(err) => warn!(error = %err, "re-load after change failed; keeping previous view"),
    }
}

/// A running pipeline watch.
pub struct PipelineWatch {
    stream: Option<EventStream<ViewChange>>,
    watchers: Vec<Arc<dyn Watcher>>,
    tasks: Vec<JoinHandle<()>>,
}

impl PipelineWatch {
    /// Take the stream of new views. Single consumer: returns `None` after
    /// the first call.
    pub fn take_stream(&mut self) -> Option<EventStream<ViewChange>> {
        self.stream.take()
    }

    /// Number of sources being watched.
    pub fn watched(&self) -> usize {
        self.watchers.len()
    }

    /// Stop every watcher and the coordinator.
    pub fn stop(&mut self) {
        for watcher in &self.watchers {
            watcher.stop();
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for PipelineWatch {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Decode a source's records into a single tree.
fn contribution(source: &str, layout: Layout, records: &[KeyValue]) -> ConfigResult<Value> {
    let mut tree = Value::empty_map();
    for record in records {
        match layout {
            Layout::Documents => match record.format.decode(&record.value) {
                Ok(Some(doc @ Value::Map(_))) => tree.merge(doc),
                Ok(Some(Value::Null)) => {}
                Ok(Some(other)) => warn!(
                    source,
                    key = %record.key,
                    kind = other.kind(),
                    "document root is not a map; ignored"
                ),
                Ok(None) => warn!(source, key = %record.key, "no decoder for record; ignored"),
                Err(err) => return Err(ConfigError::source_load(source, format!("{}: {err}", record.key))),
            },
            Layout::Entries => match record.format {
                Format::Env | Format::Raw => {
                    let raw = String::from_utf8_lossy(&record.value);
                    insert_env_entry(&mut tree, &record.key, &raw);
                }
                format => {
                    let leaf = format
                        .decode(&record.value)
                        .map_err(|err| ConfigError::source_load(source, format!("{}: {err}", record.key)))?
                        .unwrap_or(Value::Null);
                    let path: Vec<&str> = split_path(&record.key).collect();
                    if path.is_empty() {
                        tree.merge(leaf);
                    } else {
                        tree.merge(Value::nest(&path, leaf));
                    }
                }
            },
        }
    }
    Ok(tree)
}

/// Fold contributions lowest priority first; equal priorities keep
/// declaration order so the later-declared source wins.
fn merge(mut contributions: Vec<Contribution>) -> Value {
    contributions.sort_by_key(|c| c.priority);
    contributions
        .into_iter()
        .fold(Value::empty_map(), |mut acc, c| {
            acc.merge(c.tree);
            acc
        })
}

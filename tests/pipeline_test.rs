//! Source pipeline behaviour against real files and environment variables.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bootstrata::source::builtin_source_factories;
use bootstrata::{ErrorKind, SourceConfig, SourceContext, SourcePipeline};
use futures::StreamExt;

fn write(dir: &Path, name: &str, body: &str) {
    std::fs::write(dir.join(name), body).unwrap();
}

fn pipeline(dir: &Path, configs: &[SourceConfig]) -> SourcePipeline {
    SourcePipeline::build(configs, &builtin_source_factories(), &SourceContext::new(dir)).unwrap()
}

// =============================================================================
// Merge
// =============================================================================

#[test]
fn test_higher_priority_wins() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "base.yaml", "logger: {level: info, format: text}\nserver: {port: 80}\n");
    write(dir.path(), "over.yaml", "logger: {level: debug}\n");

    let pipeline = pipeline(
        dir.path(),
        &[
            SourceConfig::file("over", "over.yaml").with_priority(20),
            SourceConfig::file("base", "base.yaml").with_priority(10),
        ],
    );
    let view = pipeline.load().unwrap();
    assert_eq!(view.get("logger.level").unwrap().as_str(), Some("debug"));
    assert_eq!(view.get("logger.format").unwrap().as_str(), Some("text"));
    assert!(view.contains("server.port"));
}

#[test]
fn test_equal_priority_later_source_wins() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.yaml", "name: first\n");
    write(dir.path(), "b.json", r#"{"name": "second"}"#);

    let pipeline = pipeline(
        dir.path(),
        &[SourceConfig::file("a", "a.yaml"), SourceConfig::file("b", "b.json")],
    );
    let view = pipeline.load().unwrap();
    assert_eq!(view.get("name").unwrap().as_str(), Some("second"));
    assert_eq!(pipeline.current().to_canonical_json(), view.to_canonical_json());
}

#[test]
fn test_sequences_are_replaced() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.yaml", "hosts: [a, b, c]\n");
    write(dir.path(), "b.toml", "hosts = [\"z\"]\n");

    let pipeline = pipeline(
        dir.path(),
        &[SourceConfig::file("a", "a.yaml"), SourceConfig::file("b", "b.toml")],
    );
    let view = pipeline.load().unwrap();
    assert_eq!(view.to_canonical_json(), r#"{"hosts":["z"]}"#);
}

#[test]
fn test_canonical_json_ignores_document_order() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "one.yaml", "b: {y: 2, x: 1}\na: true\n");
    write(dir.path(), "two.json", r#"{"a": true, "b": {"x": 1, "y": 2}}"#);

    let one = pipeline(dir.path(), &[SourceConfig::file("one", "one.yaml")]);
    let two = pipeline(dir.path(), &[SourceConfig::file("two", "two.json")]);
    let json = one.load().unwrap().to_canonical_json();
    assert_eq!(json, r#"{"a":true,"b":{"x":1,"y":2}}"#);
    assert_eq!(json, two.load().unwrap().to_canonical_json());
}

#[test]
fn test_directory_source_merges_files_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("conf.d")).unwrap();
    write(dir.path(), "conf.d/10-base.yaml", "level: info\nzone: a\n");
    write(dir.path(), "conf.d/20-local.yaml", "level: warn\n");

    let pipeline = pipeline(dir.path(), &[SourceConfig::file("dir", "conf.d")]);
    let view = pipeline.load().unwrap();
    assert_eq!(view.get("level").unwrap().as_str(), Some("warn"));
    assert_eq!(view.get("zone").unwrap().as_str(), Some("a"));
}

#[test]
fn test_optional_file_may_be_missing() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "base.yaml", "a: 1\n");

    let pipeline = pipeline(
        dir.path(),
        &[
            SourceConfig::file("base", "base.yaml"),
            SourceConfig::file("local", "local.yaml").optional(),
        ],
    );
    let view = pipeline.load().unwrap();
    assert_eq!(view.to_canonical_json(), r#"{"a":1}"#);

    let strict = self::pipeline(dir.path(), &[SourceConfig::file("local", "local.yaml")]);
    assert_eq!(strict.load().unwrap_err().kind(), ErrorKind::SourceLoadError);
}

// =============================================================================
// Environment
// =============================================================================

#[test]
fn test_env_underscores_nest() {
    std::env::set_var("BSTRATA_NEST_FOO_BAR", "x");
    std::env::set_var("BSTRATA_NEST_LOGGER_LEVEL", "warn");

    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path(), &[SourceConfig::env("env", ["BSTRATA_NEST_"])]);
    let view = pipeline.load().unwrap();
    assert_eq!(
        view.to_canonical_json(),
        r#"{"foo":{"bar":"x"},"logger":{"level":"warn"}}"#
    );

    std::env::remove_var("BSTRATA_NEST_FOO_BAR");
    std::env::remove_var("BSTRATA_NEST_LOGGER_LEVEL");
}

#[test]
fn test_env_prefix_boundaries() {
    std::env::set_var("BSTRATA_EDGE", "bare");
    std::env::set_var("BSTRATA_EDGEX_NAME", "neighbour");
    std::env::set_var("BSTRATA_EDGE_NAME", "kept");

    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path(), &[SourceConfig::env("env", ["BSTRATA_EDGE"])]);
    let view = pipeline.load().unwrap();
    assert_eq!(view.to_canonical_json(), r#"{"name":"kept"}"#);

    std::env::remove_var("BSTRATA_EDGE");
    std::env::remove_var("BSTRATA_EDGEX_NAME");
    std::env::remove_var("BSTRATA_EDGE_NAME");
}

#[test]
fn test_env_overrides_file() {
    std::env::set_var("BSTRATA_OVR_SERVER_PORT", "9090");

    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "app.yaml", "server: {port: 8080, host: localhost}\n");
    let pipeline = pipeline(
        dir.path(),
        &[
            SourceConfig::file("app", "app.yaml"),
            SourceConfig::env("env", ["BSTRATA_OVR_"]).with_priority(100),
        ],
    );
    let view = pipeline.load().unwrap();
    assert_eq!(view.get("server.port").unwrap().as_str(), Some("9090"));
    assert_eq!(view.get("server.host").unwrap().as_str(), Some("localhost"));

    std::env::remove_var("BSTRATA_OVR_SERVER_PORT");
}

#[test]
fn test_env_without_prefixes_contributes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let no_prefixes: [&str; 0] = [];
    let pipeline = pipeline(dir.path(), &[SourceConfig::env("env", no_prefixes)]);
    assert_eq!(pipeline.load().unwrap().to_canonical_json(), "{}");
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_unknown_source_type() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = SourceConfig::file("remote", "x");
    config.kind = "etcd".to_string();

    let err = SourcePipeline::build(&[config], &builtin_source_factories(), &SourceContext::new(dir.path()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FactoryNotFound);
}

#[test]
fn test_close_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.yaml", "a: 1\n");
    let pipeline = pipeline(dir.path(), &[SourceConfig::file("a", "a.yaml")]);
    pipeline.load().unwrap();
    pipeline.close();
    pipeline.close();
    assert_eq!(pipeline.names(), vec!["a"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watch_publishes_new_view() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "app.yaml", "logger: {level: info}\n");

    let pipeline = Arc::new(pipeline(
        dir.path(),
        &[
            SourceConfig::file("app", "app.yaml"),
            SourceConfig::env("env", ["BSTRATA_WATCH_"]),
        ],
    ));
    pipeline.load().unwrap();

    let invalidations = Arc::new(AtomicUsize::new(0));
    {
        let invalidations = Arc::clone(&invalidations);
        pipeline.on_invalidate(move |_| {
            invalidations.fetch_add(1, Ordering::SeqCst);
        });
    }

    let mut watch = pipeline.watch().unwrap();
    assert_eq!(watch.watched(), 1);
    let mut stream = watch.take_stream().unwrap();
    assert!(watch.take_stream().is_none());

    tokio::time::sleep(Duration::from_millis(100)).await;
    write(dir.path(), "app.yaml", "logger: {level: debug}\n");

    let change = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(change) = stream.next().await {
            if change.view.get("logger.level").ok().and_then(|v| v.as_str()) == Some("debug") {
                return Some(change);
            }
        }
        None
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(change.event.source, "app");
    assert!(change.event.changed_keys.contains(&"app.yaml".to_string()));
    assert!(invalidations.load(Ordering::SeqCst) >= 1);
    assert_eq!(
        pipeline.current().get("logger.level").unwrap().as_str(),
        Some("debug")
    );

    watch.stop();
    pipeline.close();
}

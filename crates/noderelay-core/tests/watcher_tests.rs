//! File watching restarts the runtime.

mod support;

use noderelay::{BackoffPolicy, EngineOptions, InvocationEngine, ModuleSource};
use serde_json::json;
use std::time::Duration;
use support::{init_tracing, FakeLauncher};
use tempfile::TempDir;

async fn wait_for_generation(engine: &InvocationEngine, generation: u64) -> bool {
    for _ in 0..50 {
        if engine.current_generation() == Some(generation) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

#[tokio::test]
async fn test_source_change_restarts_runtime() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new();

    let mut options = EngineOptions::new()
        .with_backoff(BackoffPolicy::none())
        .with_watch_path(dir.path());
    options.watch_debounce_ms = 100;

    let engine = InvocationEngine::builder(launcher.clone())
        .options(options)
        .build()
        .await
        .unwrap();

    let module = ModuleSource::file(dir.path().join("handler.js"));
    engine.invoke(module.clone(), Some("echo"), vec![]).await.unwrap();
    assert_eq!(engine.current_generation(), Some(1));

    // Irrelevant extensions are ignored
    std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(engine.current_generation(), Some(1));

    std::fs::write(dir.path().join("handler.js"), "module.exports = 1").unwrap();
    assert!(wait_for_generation(&engine, 2).await, "runtime was not restarted");

    let instance = engine.invoke(module, Some("instance"), vec![]).await.unwrap();
    assert_eq!(instance, json!(2));
}

#[tokio::test]
async fn test_missing_watch_path_is_config_error() {
    init_tracing();
    let result = InvocationEngine::builder(FakeLauncher::new())
        .options(EngineOptions::new().with_watch_path("/nonexistent/noderelay/watch"))
        .build()
        .await;
    assert!(matches!(
        result,
        Err(noderelay::RelayError::Configuration { .. })
    ));
}

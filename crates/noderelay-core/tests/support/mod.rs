//! In-process fake runtime for integration tests.
//!
//! Each "process" is an axum server on 127.0.0.1 speaking the invoke wire
//! format. Exports understood by the fake:
//!
//! - `echo` (and the default export): returns the args array
//! - `add`: sums numeric args
//! - `sleep`: `[ms, value]`, waits then returns `value`
//! - `throw`: fails with a JavaScript error
//! - `crash`: kills the process serving it
//! - `instance`: returns the id of the process serving it

#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use noderelay::{
    InvocationReply, InvocationWire, ModuleSource, RelayError, Result, RuntimeLauncher,
    RuntimeProcess,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    Healthy,
    /// Processes exit before signalling readiness.
    FailStart,
    /// Processes never signal readiness.
    Hang,
}

#[derive(Clone)]
struct InstanceState {
    id: u32,
    killed: watch::Sender<bool>,
    cache: Arc<Mutex<HashMap<String, String>>>,
    invocations: Arc<AtomicU32>,
}

struct LauncherInner {
    mode: Mutex<LaunchMode>,
    /// Launches that fail before `mode` applies.
    fail_next: AtomicU32,
    launches: AtomicU32,
    invocations: Arc<AtomicU32>,
    instances: Mutex<Vec<watch::Sender<bool>>>,
}

/// Launcher for fake runtime processes. Clones share state.
#[derive(Clone)]
pub struct FakeLauncher {
    inner: Arc<LauncherInner>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::with_mode(LaunchMode::Healthy)
    }

    pub fn with_mode(mode: LaunchMode) -> Self {
        Self {
            inner: Arc::new(LauncherInner {
                mode: Mutex::new(mode),
                fail_next: AtomicU32::new(0),
                launches: AtomicU32::new(0),
                invocations: Arc::new(AtomicU32::new(0)),
                instances: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn set_mode(&self, mode: LaunchMode) {
        *self.inner.mode.lock().unwrap() = mode;
    }

    /// Make the next `count` launches fail to start.
    pub fn fail_next(&self, count: u32) {
        self.inner.fail_next.store(count, Ordering::SeqCst);
    }

    /// Number of processes launched so far.
    pub fn launches(&self) -> u32 {
        self.inner.launches.load(Ordering::SeqCst)
    }

    /// Number of invocations received across all processes.
    pub fn invocations(&self) -> u32 {
        self.inner.invocations.load(Ordering::SeqCst)
    }

    /// Kill the most recently launched process.
    pub fn kill_current(&self) {
        if let Some(killed) = self.inner.instances.lock().unwrap().last() {
            killed.send_replace(true);
        }
    }
}

#[async_trait]
impl RuntimeLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Box<dyn RuntimeProcess>> {
        let id = self.inner.launches.fetch_add(1, Ordering::SeqCst) + 1;

        let failing = self
            .inner
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let mode = if failing {
            LaunchMode::FailStart
        } else {
            *self.inner.mode.lock().unwrap()
        };

        let (killed, _) = watch::channel(false);
        let endpoint = if mode == LaunchMode::Healthy {
            let state = InstanceState {
                id,
                killed: killed.clone(),
                cache: Arc::new(Mutex::new(HashMap::new())),
                invocations: self.inner.invocations.clone(),
            };
            Some(serve(state).await)
        } else {
            None
        };

        self.inner.instances.lock().unwrap().push(killed.clone());

        Ok(Box::new(FakeProcess {
            id,
            mode,
            endpoint,
            killed,
        }))
    }
}

struct FakeProcess {
    id: u32,
    mode: LaunchMode,
    endpoint: Option<SocketAddr>,
    killed: watch::Sender<bool>,
}

#[async_trait]
impl RuntimeProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        Some(100_000 + self.id)
    }

    async fn wait_ready(&mut self) -> Result<SocketAddr> {
        match (self.mode, self.endpoint) {
            (LaunchMode::Healthy, Some(endpoint)) => Ok(endpoint),
            (LaunchMode::Hang, _) => std::future::pending().await,
            _ => Err(RelayError::start_failure(
                "runtime exited before signalling readiness (exit status: 1)",
            )),
        }
    }

    async fn wait_exit(&mut self) -> Option<i32> {
        let mut rx = self.killed.subscribe();
        let _ = rx.wait_for(|killed| *killed).await;
        Some(137)
    }

    async fn terminate(&mut self, _grace: Duration) -> Option<i32> {
        self.killed.send_replace(true);
        None
    }
}

async fn serve(state: InstanceState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut shutdown = state.killed.subscribe();

    let app = Router::new()
        .route("/invoke", post(invoke))
        .with_state(state);

    tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|killed| *killed).await;
            })
            .await;
    });
    addr
}

async fn invoke(State(state): State<InstanceState>, Json(wire): Json<InvocationWire>) -> Response {
    state.invocations.fetch_add(1, Ordering::SeqCst);

    let mut killed = state.killed.subscribe();
    if *killed.borrow() {
        return stopped();
    }

    tokio::select! {
        response = handle(&state, wire) => response,
        _ = killed.wait_for(|killed| *killed) => stopped(),
    }
}

fn stopped() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "runtime stopped").into_response()
}

async fn handle(state: &InstanceState, wire: InvocationWire) -> Response {
    let id = wire.invocation_id;

    match &wire.module_source {
        ModuleSource::String {
            source,
            cache_key: Some(key),
        } => {
            state
                .cache
                .lock()
                .unwrap()
                .insert(key.clone(), source.clone());
        }
        ModuleSource::Cache { key } => {
            if !state.cache.lock().unwrap().contains_key(key) {
                return (
                    StatusCode::NOT_FOUND,
                    Json(InvocationReply::err(id, format!("module {} not cached", key), None)),
                )
                    .into_response();
            }
        }
        _ => {}
    }

    let args = wire.args;
    let reply = match wire.export_identifier.as_deref() {
        None | Some("echo") => InvocationReply::ok(id, Value::Array(args)),
        Some("add") => InvocationReply::ok(
            id,
            json!(args.iter().filter_map(Value::as_i64).sum::<i64>()),
        ),
        Some("sleep") => {
            let ms = args.first().and_then(Value::as_u64).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            InvocationReply::ok(id, args.get(1).cloned().unwrap_or(Value::Null))
        }
        Some("throw") => {
            let message = args
                .first()
                .and_then(Value::as_str)
                .unwrap_or("boom")
                .to_string();
            let stack = format!("Error: {}\n    at throw (module.js:1:7)", message);
            InvocationReply::err(id, message, Some(stack))
        }
        Some("crash") => {
            state.killed.send_replace(true);
            return stopped();
        }
        Some("instance") => InvocationReply::ok(id, json!(state.id)),
        Some(other) => InvocationReply::err(id, format!("export {} not found", other), None),
    };

    (StatusCode::OK, Json(reply)).into_response()
}

/// Install a test subscriber once; `RUST_LOG` controls the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

//! Invocation engine facade.
//!
//! # Example
//!
//! ```rust,no_run
//! use noderelay::{EngineOptions, InvocationEngine, ModuleSource, NodeLauncher, NodeLauncherConfig};
//! use serde_json::json;
//!
//! # async fn run() -> noderelay::Result<()> {
//! let launcher = NodeLauncher::new(NodeLauncherConfig::new("runtime/entry.js"));
//! let engine = InvocationEngine::builder(launcher)
//!     .options(EngineOptions::new().with_timeout_ms(5_000))
//!     .build()
//!     .await?;
//!
//! let sum = engine
//!     .invoke(ModuleSource::file("scripts/math.js"), Some("add"), vec![json!(1), json!(2)])
//!     .await?;
//! assert_eq!(sum, json!(3));
//!
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod blocking;
mod builder;

pub use blocking::BlockingEngine;
pub use builder::EngineBuilder;

use crate::cancel::CancellationToken;
use crate::error::{RelayError, Result};
use crate::invocation::{InvocationRequest, ModuleSource};
use crate::multiplexer::InvocationMultiplexer;
use crate::process::{ProcessSupervisor, RuntimeLauncher, SupervisorEvent};
use crate::recovery::{BackoffPolicy, RecoveryAction, RecoveryController};
use crate::timeout::EffectiveTimeout;
use crate::watcher::RuntimeWatcher;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

/// Per-call overrides.
#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    /// Replaces the engine-wide timeout for this call.
    pub timeout: Option<EffectiveTimeout>,
    pub cancellation: Option<CancellationToken>,
}

impl InvokeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the timeout with a configured value (`-1` for infinite).
    ///
    /// Values below `-1` are rejected here, not at invocation time.
    pub fn with_timeout_ms(mut self, timeout_ms: i64) -> Result<Self> {
        self.timeout = Some(EffectiveTimeout::from_configured_ms(timeout_ms)?);
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: EffectiveTimeout) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

struct EngineInner {
    supervisor: Arc<ProcessSupervisor>,
    multiplexer: InvocationMultiplexer,
    timeout: EffectiveTimeout,
    max_retries: u32,
    backoff: BackoffPolicy,
    _watcher: Option<RuntimeWatcher>,
}

/// Invokes JavaScript exports in a supervised runtime process.
///
/// Cheap to clone; clones share the runtime.
#[derive(Clone)]
pub struct InvocationEngine {
    inner: Arc<EngineInner>,
}

impl InvocationEngine {
    /// Start configuring an engine around a launcher.
    pub fn builder(launcher: impl RuntimeLauncher) -> EngineBuilder {
        EngineBuilder::new(launcher)
    }

    /// Build an engine with the given options and the HTTP transport.
    pub async fn new(
        launcher: impl RuntimeLauncher,
        options: crate::config::EngineOptions,
    ) -> Result<Self> {
        EngineBuilder::new(launcher).options(options).build().await
    }

    /// Invoke an export with the engine's timeout.
    ///
    /// `export` of `None` calls the module's default export.
    pub async fn invoke(
        &self,
        module_source: ModuleSource,
        export: Option<&str>,
        args: Vec<Value>,
    ) -> Result<Value> {
        self.invoke_with(module_source, export, args, InvokeOptions::default())
            .await
    }

    /// Invoke with per-call options.
    pub async fn invoke_with(
        &self,
        module_source: ModuleSource,
        export: Option<&str>,
        args: Vec<Value>,
        options: InvokeOptions,
    ) -> Result<Value> {
        let timeout = options.timeout.unwrap_or(self.inner.timeout);
        let request =
            InvocationRequest::new(module_source, export.map(str::to_string), args, timeout);
        self.run(request, options.cancellation.as_ref()).await
    }

    /// Invoke and deserialize the result.
    pub async fn invoke_as<T: DeserializeOwned>(
        &self,
        module_source: ModuleSource,
        export: Option<&str>,
        args: Vec<Value>,
    ) -> Result<T> {
        let value = self.invoke(module_source, export, args).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Invoke a module previously cached under `key`.
    ///
    /// Returns `Ok(None)` if the runtime does not have it.
    pub async fn try_invoke_from_cache(
        &self,
        key: &str,
        export: Option<&str>,
        args: Vec<Value>,
    ) -> Result<Option<Value>> {
        match self.invoke(ModuleSource::cache(key), export, args).await {
            Ok(value) => Ok(Some(value)),
            Err(RelayError::ModuleNotCached { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// The timeout applied when a call does not override it.
    pub fn effective_timeout(&self) -> EffectiveTimeout {
        self.inner.timeout
    }

    /// Generation of the running process, if any.
    pub fn current_generation(&self) -> Option<u64> {
        self.inner.supervisor.current_generation()
    }

    /// Restart the runtime now. Returns the new generation.
    pub async fn restart_runtime(&self) -> Result<u64> {
        Ok(self.inner.supervisor.restart().await?.generation())
    }

    /// Stop the runtime. Later invocations fail with `EngineUnavailable`.
    pub async fn shutdown(&self) {
        self.inner.supervisor.shutdown().await;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.inner.supervisor.subscribe()
    }

    /// Drive one invocation to its single outcome.
    async fn run(
        &self,
        mut request: InvocationRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value> {
        let inner = &self.inner;
        let mut controller = RecoveryController::new(inner.max_retries, inner.backoff.clone());
        let mut carried: Option<RelayError> = None;

        loop {
            if let Some(token) = cancel {
                token.check()?;
            }

            let (err, generation) = match carried.take() {
                Some(err) => (err, None),
                None => match cancellable(inner.supervisor.ensure_started(), cancel).await {
                    Ok(handle) => {
                        let generation = handle.generation();
                        controller.on_dispatch();
                        let pending = inner.multiplexer.submit(handle, request.clone());
                        match pending.wait(cancel).await {
                            Ok(value) => {
                                controller.on_success();
                                if request.attempt > 1 {
                                    debug!(
                                        "Invocation succeeded on attempt {}",
                                        request.attempt
                                    );
                                }
                                return Ok(value);
                            }
                            Err(err) => (err, Some(generation)),
                        }
                    }
                    Err(err) => (err, None),
                },
            };

            match controller.on_failure(&err) {
                RecoveryAction::Surface => {
                    debug_assert!(!err.is_internal(), "internal error surfaced: {}", err);
                    return Err(err);
                }
                RecoveryAction::Exhausted => return Err(controller.exhausted_error()),
                RecoveryAction::Resubmit => {}
                RecoveryAction::RestartAndResubmit { delay } => {
                    pause(delay, cancel).await?;
                    if let Some(generation) = generation {
                        if let Err(e) = inner.supervisor.restart_if_current(generation).await {
                            carried = Some(e);
                        }
                    }
                }
                RecoveryAction::RetryStart { delay } => {
                    pause(delay, cancel).await?;
                }
            }

            request = request.next_attempt(controller.attempt());
        }
    }
}

/// Sleep for `delay` unless cancelled first.
async fn pause(delay: Duration, cancel: Option<&CancellationToken>) -> Result<()> {
    if delay.is_zero() {
        return Ok(());
    }
    cancellable(
        async {
            tokio::time::sleep(delay).await;
            Ok(())
        },
        cancel,
    )
    .await
}

/// Run `future` unless cancellation wins the race.
async fn cancellable<T>(
    future: impl Future<Output = Result<T>>,
    cancel: Option<&CancellationToken>,
) -> Result<T> {
    match cancel {
        Some(token) => tokio::select! {
            result = future => result,
            _ = token.cancelled() => Err(RelayError::Cancelled),
        },
        None => future.await,
    }
}

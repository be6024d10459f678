//! Builder for configuring an [`InvocationEngine`].

use super::{EngineInner, InvocationEngine};
use crate::config::EngineOptions;
use crate::error::Result;
use crate::multiplexer::InvocationMultiplexer;
use crate::process::{ProcessSupervisor, RuntimeLauncher};
use crate::transport::{HttpTransport, Transport};
use crate::watcher::RuntimeWatcher;
use std::sync::Arc;
use tracing::info;

/// Builder for an [`InvocationEngine`].
///
/// ```rust,no_run
/// use noderelay::{EngineOptions, InvocationEngine, NodeLauncher, NodeLauncherConfig};
///
/// # async fn run() -> noderelay::Result<()> {
/// let engine = InvocationEngine::builder(NodeLauncher::new(NodeLauncherConfig::new("entry.js")))
///     .options(EngineOptions::new().with_max_retries(2))
///     .eager_start(true)
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct EngineBuilder {
    launcher: Arc<dyn RuntimeLauncher>,
    options: EngineOptions,
    transport: Option<Arc<dyn Transport>>,
    eager_start: bool,
}

impl EngineBuilder {
    pub fn new(launcher: impl RuntimeLauncher) -> Self {
        Self::from_arc(Arc::new(launcher))
    }

    /// Use a launcher that is already shared.
    pub fn from_arc(launcher: Arc<dyn RuntimeLauncher>) -> Self {
        Self {
            launcher,
            options: EngineOptions::default(),
            transport: None,
            eager_start: false,
        }
    }

    /// Replace all options.
    pub fn options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the invocation timeout in milliseconds (`-1` for infinite).
    pub fn timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.options.timeout_ms = timeout_ms;
        self
    }

    /// Set the recovery budget per invocation.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.options.max_retries = max_retries;
        self
    }

    /// Use a custom transport instead of HTTP.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Start the runtime during `build` instead of on first use.
    ///
    /// Default: `false`
    pub fn eager_start(mut self, enable: bool) -> Self {
        self.eager_start = enable;
        self
    }

    /// Validate the options and build the engine.
    ///
    /// Invalid options fail here with a configuration error.
    pub async fn build(self) -> Result<InvocationEngine> {
        let timeout = self.options.validate()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new()?),
        };

        let supervisor = Arc::new(ProcessSupervisor::new(
            self.launcher,
            self.options.startup_timeout(),
            self.options.terminate_grace(),
        ));

        let watcher = if self.options.watch_paths.is_empty() {
            None
        } else {
            Some(RuntimeWatcher::start(
                &self.options.watch_paths,
                self.options.watch_extensions.clone(),
                self.options.watch_debounce(),
                Arc::downgrade(&supervisor),
            )?)
        };

        if self.eager_start {
            supervisor.ensure_started().await?;
        }

        info!(
            "Invocation engine ready (timeout {}, max retries {})",
            timeout, self.options.max_retries
        );

        Ok(InvocationEngine {
            inner: Arc::new(EngineInner {
                supervisor,
                multiplexer: InvocationMultiplexer::new(transport),
                timeout,
                max_retries: self.options.max_retries,
                backoff: self.options.backoff,
                _watcher: watcher,
            }),
        })
    }
}

//! Synchronous facade over [`InvocationEngine`].

use super::{InvocationEngine, InvokeOptions};
use crate::config::EngineOptions;
use crate::error::Result;
use crate::invocation::ModuleSource;
use crate::process::RuntimeLauncher;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::{Builder, Runtime};

/// Engine for callers without an async runtime.
///
/// Owns a multi-thread Tokio runtime; any number of OS threads may call
/// [`invoke`](Self::invoke) at once. Must not be called from inside an
/// async context.
pub struct BlockingEngine {
    engine: InvocationEngine,
    runtime: Runtime,
}

impl BlockingEngine {
    pub fn new(launcher: impl RuntimeLauncher, options: EngineOptions) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .enable_all()
            .thread_name("noderelay")
            .build()?;
        let engine = runtime.block_on(InvocationEngine::builder(launcher).options(options).build())?;
        Ok(Self { engine, runtime })
    }

    pub fn invoke(
        &self,
        module_source: ModuleSource,
        export: Option<&str>,
        args: Vec<Value>,
    ) -> Result<Value> {
        self.runtime
            .block_on(self.engine.invoke(module_source, export, args))
    }

    pub fn invoke_with(
        &self,
        module_source: ModuleSource,
        export: Option<&str>,
        args: Vec<Value>,
        options: InvokeOptions,
    ) -> Result<Value> {
        self.runtime
            .block_on(self.engine.invoke_with(module_source, export, args, options))
    }

    pub fn invoke_as<T: DeserializeOwned>(
        &self,
        module_source: ModuleSource,
        export: Option<&str>,
        args: Vec<Value>,
    ) -> Result<T> {
        self.runtime
            .block_on(self.engine.invoke_as(module_source, export, args))
    }

    pub fn try_invoke_from_cache(
        &self,
        key: &str,
        export: Option<&str>,
        args: Vec<Value>,
    ) -> Result<Option<Value>> {
        self.runtime
            .block_on(self.engine.try_invoke_from_cache(key, export, args))
    }

    /// The async engine behind this facade.
    pub fn engine(&self) -> &InvocationEngine {
        &self.engine
    }

    /// Stop the runtime process and the Tokio runtime.
    pub fn shutdown(self) {
        self.runtime.block_on(self.engine.shutdown());
    }
}

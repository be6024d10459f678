//! noderelay - invoke JavaScript in a supervised, out-of-process runtime.
//!
//! The engine spawns a runtime process (Node.js by default), sends it
//! invocations over HTTP, and recovers from crashes by restarting the process
//! and resubmitting in-flight calls, up to a configured retry budget.
//!
//! # Example
//!
//! ```rust,no_run
//! use noderelay::{InvocationEngine, ModuleSource, NodeLauncher, NodeLauncherConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> noderelay::Result<()> {
//!     let launcher = NodeLauncher::new(NodeLauncherConfig::new("runtime/entry.js"));
//!     let engine = InvocationEngine::builder(launcher).build().await?;
//!
//!     let greeting = engine
//!         .invoke(
//!             ModuleSource::string("module.exports = (name) => `hello ${name}`;"),
//!             None,
//!             vec![json!("world")],
//!         )
//!         .await?;
//!     println!("{}", greeting);
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod invocation;
pub mod multiplexer;
pub mod platform;
pub mod process;
pub mod recovery;
pub mod timeout;
pub mod transport;
pub mod watcher;

// Re-export commonly used types
pub use cancel::CancellationToken;
pub use config::{EngineOptions, RuntimeConfig};
pub use engine::{BlockingEngine, EngineBuilder, InvocationEngine, InvokeOptions};
pub use error::{ErrorKind, RelayError, Result};
pub use invocation::{InvocationId, InvocationRequest, ModuleSource};
pub use multiplexer::{InvocationMultiplexer, PendingInvocation, PendingTable};
pub use process::{
    NodeLauncher, NodeLauncherConfig, ProcessState, ProcessSupervisor, RuntimeLauncher,
    RuntimeProcess, RuntimeProcessHandle, SupervisorEvent,
};
pub use recovery::{BackoffPolicy, FailureClass, InvocationState, RecoveryAction, RecoveryController};
pub use timeout::{effective_timeout, EffectiveTimeout};
pub use transport::{HttpTransport, InvocationReply, InvocationWire, RemoteError, Transport};

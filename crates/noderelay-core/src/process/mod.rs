//! Runtime process lifecycle.
//!
//! - [`launcher`] spawns processes and waits for readiness
//! - [`supervisor`] owns the current process and its generation
//! - [`handle`] is what the rest of the engine holds on to

mod handle;
mod launcher;
mod supervisor;

#[cfg(test)]
pub(crate) use handle::test_handle;
pub use handle::{ProcessState, RuntimeProcessHandle};
pub use launcher::{
    parse_endpoint, NodeLauncher, NodeLauncherConfig, RuntimeLauncher, RuntimeProcess,
};
pub use supervisor::{ProcessSupervisor, SupervisorEvent};

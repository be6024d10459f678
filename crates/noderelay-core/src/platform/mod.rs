//! Platform abstraction layer.
//!
//! All `#[cfg]` blocks for OS-specific process handling live here.

pub mod process;

pub use process::{request_termination, terminate_child};

//! Retry and recovery for invocations.

mod backoff;
mod controller;

pub use backoff::BackoffPolicy;
pub use controller::{FailureClass, InvocationState, RecoveryAction, RecoveryController};

//! Per-invocation recovery state machine.
//!
//! ```text
//! Idle -> Dispatched -> Succeeded
//!                    -> Retrying -> Dispatched
//!                    -> TerminallyFailed
//! ```
//!
//! Each failure is classified into a [`FailureClass`] and mapped to a
//! [`RecoveryAction`]. Stale-generation failures resubmit for free; transport
//! and startup failures spend one unit of the `MaxRetries` budget.

use super::backoff::BackoffPolicy;
use crate::error::{ErrorKind, RelayError};
use std::time::Duration;
use tracing::{debug, warn};

/// Free resubmits allowed after stale-generation failures before they start
/// counting against the budget. Stops a runtime that restarts in a tight loop
/// from pinning an invocation forever.
const MAX_FREE_RESUBMITS: u32 = 16;

/// How the controller treats a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The bound generation was superseded.
    Stale,
    /// Transport lost or runtime exited unexpectedly.
    Transport,
    /// The runtime could not be started.
    Startup,
    /// Ends the invocation as-is.
    Terminal,
}

impl FailureClass {
    pub fn of(err: &RelayError) -> Self {
        match err.kind() {
            ErrorKind::StaleGeneration => FailureClass::Stale,
            ErrorKind::TransportUnavailable => FailureClass::Transport,
            _ if err.is_terminal() => FailureClass::Terminal,
            _ => FailureClass::Startup,
        }
    }
}

/// What the engine does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Submit again against whatever handle is current.
    Resubmit,
    /// Restart the failed generation (coalesced), wait `delay`, resubmit.
    RestartAndResubmit { delay: Duration },
    /// Wait `delay`, then try to start the runtime again.
    RetryStart { delay: Duration },
    /// Return the error to the caller.
    Surface,
    /// Budget spent; fail with `EngineUnavailable`.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Idle,
    Dispatched,
    Retrying,
    Succeeded,
    TerminallyFailed,
}

/// Tracks one invocation through its attempts.
#[derive(Debug)]
pub struct RecoveryController {
    max_retries: u32,
    backoff: BackoffPolicy,
    state: InvocationState,
    recoveries: u32,
    free_resubmits: u32,
    last_failure: Option<String>,
}

impl RecoveryController {
    pub fn new(max_retries: u32, backoff: BackoffPolicy) -> Self {
        Self {
            max_retries,
            backoff,
            state: InvocationState::Idle,
            recoveries: 0,
            free_resubmits: 0,
            last_failure: None,
        }
    }

    pub fn state(&self) -> InvocationState {
        self.state
    }

    /// Recovery attempts spent so far.
    pub fn recoveries(&self) -> u32 {
        self.recoveries
    }

    /// Total dispatches so far, counting the first one.
    pub fn attempt(&self) -> u32 {
        self.recoveries + self.free_resubmits + 1
    }

    pub fn on_dispatch(&mut self) {
        debug_assert!(matches!(
            self.state,
            InvocationState::Idle | InvocationState::Retrying
        ));
        self.state = InvocationState::Dispatched;
    }

    pub fn on_success(&mut self) {
        self.state = InvocationState::Succeeded;
    }

    /// Classify a failure and decide what to do next.
    pub fn on_failure(&mut self, err: &RelayError) -> RecoveryAction {
        let class = FailureClass::of(err);
        self.last_failure = Some(err.to_string());

        let class = if class == FailureClass::Stale && self.free_resubmits >= MAX_FREE_RESUBMITS {
            FailureClass::Transport
        } else {
            class
        };

        match class {
            FailureClass::Terminal => {
                self.state = InvocationState::TerminallyFailed;
                RecoveryAction::Surface
            }
            FailureClass::Stale => {
                self.free_resubmits += 1;
                self.state = InvocationState::Retrying;
                debug!("Generation superseded, resubmitting ({})", err);
                RecoveryAction::Resubmit
            }
            FailureClass::Transport | FailureClass::Startup => {
                if self.recoveries >= self.max_retries {
                    self.state = InvocationState::TerminallyFailed;
                    warn!(
                        "Recovery budget of {} exhausted. Last error: {}",
                        self.max_retries, err
                    );
                    return RecoveryAction::Exhausted;
                }

                let used = self.recoveries;
                self.recoveries += 1;
                self.state = InvocationState::Retrying;

                if class == FailureClass::Transport {
                    // First restart is immediate, later ones back off
                    let delay = match used {
                        0 => Duration::ZERO,
                        n => self.backoff.delay_for(n - 1),
                    };
                    warn!(
                        "Attempt {} failed: {}. Restarting runtime ({}/{})",
                        self.attempt() - 1,
                        err,
                        self.recoveries,
                        self.max_retries
                    );
                    RecoveryAction::RestartAndResubmit { delay }
                } else {
                    let delay = self.backoff.delay_for(used);
                    warn!(
                        "Runtime start failed: {}. Retrying in {:?} ({}/{})",
                        err, delay, self.recoveries, self.max_retries
                    );
                    RecoveryAction::RetryStart { delay }
                }
            }
        }
    }

    /// Build the `EngineUnavailable` error for an exhausted budget.
    pub fn exhausted_error(&self) -> RelayError {
        RelayError::EngineUnavailable {
            attempts: self.recoveries,
            message: self
                .last_failure
                .clone()
                .unwrap_or_else(|| "runtime unavailable".to_string()),
        }
    }
}

//! Invocation multiplexer.
//!
//! Many invocations share one runtime. Each dispatch gets its own entry in
//! the [`PendingTable`] and its own task driving the transport; outcomes are
//! routed back by invocation id only.

mod pending;

pub use pending::PendingTable;

use crate::cancel::CancellationToken;
use crate::error::{RelayError, Result};
use crate::invocation::{InvocationId, InvocationRequest};
use crate::process::RuntimeProcessHandle;
use crate::timeout::EffectiveTimeout;
use crate::transport::Transport;
use pending::Outcome;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

/// Routes dispatches through a transport and their outcomes back to callers.
pub struct InvocationMultiplexer {
    transport: Arc<dyn Transport>,
    pending: Arc<PendingTable>,
}

impl InvocationMultiplexer {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            pending: Arc::new(PendingTable::new()),
        }
    }

    /// Number of dispatches still waiting for an outcome.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Dispatch `request` to the process behind `handle`.
    ///
    /// The request is bound to the handle's generation for its whole life.
    pub fn submit(
        &self,
        handle: Arc<RuntimeProcessHandle>,
        request: InvocationRequest,
    ) -> PendingInvocation {
        let id = request.id;
        let timeout = request.timeout;
        let generation = handle.generation();
        let rx = self.pending.register(id);

        let transport = self.transport.clone();
        let pending = self.pending.clone();
        tokio::spawn(async move {
            let outcome = transport.send(&handle, &request).await;
            if !pending.complete(id, outcome) {
                debug!("Discarding late outcome for invocation {}", id);
            }
        });

        PendingInvocation {
            id,
            generation,
            timeout,
            rx,
            pending: self.pending.clone(),
        }
    }
}

/// The caller's side of one dispatch.
pub struct PendingInvocation {
    id: InvocationId,
    generation: u64,
    timeout: EffectiveTimeout,
    rx: oneshot::Receiver<Outcome>,
    pending: Arc<PendingTable>,
}

impl PendingInvocation {
    pub fn id(&self) -> InvocationId {
        self.id
    }

    /// Generation the dispatch is bound to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait for the outcome, the timeout, or cancellation, whichever first.
    pub async fn wait(mut self, cancel: Option<&CancellationToken>) -> Result<Value> {
        let timeout = self.timeout;

        let interrupted = tokio::select! {
            outcome = timeout.run(&mut self.rx) => match outcome {
                Ok(received) => return flatten(received),
                Err(elapsed) => RelayError::InvocationTimeout(elapsed),
            },
            _ = wait_cancelled(cancel) => RelayError::Cancelled,
        };

        if self.pending.cancel(self.id) {
            debug!("Invocation {} abandoned: {}", self.id, interrupted);
            return Err(interrupted);
        }

        // The response path claimed the entry first, its outcome is on the way
        flatten((&mut self.rx).await)
    }
}

impl Drop for PendingInvocation {
    fn drop(&mut self) {
        self.pending.cancel(self.id);
    }
}

fn flatten(received: std::result::Result<Outcome, oneshot::error::RecvError>) -> Result<Value> {
    received.unwrap_or_else(|_| Err(RelayError::transport("dispatch ended without an outcome")))
}

async fn wait_cancelled(cancel: Option<&CancellationToken>) {
    match cancel {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

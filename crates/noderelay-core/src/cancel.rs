//! Cancellation token for in-flight invocations.
//!
//! Clones share state. Cancelling any clone wakes every task awaiting
//! [`CancellationToken::cancelled`].

use crate::error::{RelayError, Result};
use tokio_util::sync::CancellationToken as TokenInner;

/// A cancellation token for cooperative cancellation of invocations.
///
/// ```
/// use noderelay::CancellationToken;
///
/// let token = CancellationToken::new();
/// let observer = token.clone();
///
/// token.cancel();
/// assert!(observer.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: TokenInner,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Resolve once cancellation has been requested.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await;
    }

    /// Return `Cancelled` if cancellation has been requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(RelayError::Cancelled)
        } else {
            Ok(())
        }
    }
}

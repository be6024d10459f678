//! Table of invocations waiting for their outcome.
//!
//! Each entry is claimed exactly once: by the response path through
//! [`PendingTable::complete`] or by the timeout/cancellation path through
//! [`PendingTable::cancel`]. Whoever claims second gets `false`.

use crate::error::Result;
use crate::invocation::InvocationId;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::oneshot;

pub(crate) type Outcome = Result<Value>;

#[derive(Debug, Default)]
pub struct PendingTable {
    entries: Mutex<HashMap<InvocationId, oneshot::Sender<Outcome>>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an id and get the receiving end of its outcome.
    pub fn register(&self, id: InvocationId) -> oneshot::Receiver<Outcome> {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(id, tx);
        rx
    }

    /// Deliver an outcome. Returns `false` if the entry was already claimed.
    pub fn complete(&self, id: InvocationId, outcome: Outcome) -> bool {
        let sender = self.lock().remove(&id);
        match sender {
            Some(tx) => {
                // A dropped receiver means the waiter went away; the claim still counts
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Claim an entry without delivering. Returns `false` if already claimed.
    pub fn cancel(&self, id: InvocationId) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<InvocationId, oneshot::Sender<Outcome>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_complete_delivers_once() {
        let table = PendingTable::new();
        let id = InvocationId::new();
        let rx = table.register(id);
        assert_eq!(table.len(), 1);

        assert!(table.complete(id, Ok(json!(42))));
        assert!(!table.complete(id, Ok(json!(43))));
        assert!(!table.cancel(id));
        assert_eq!(table.len(), 0);

        assert_eq!(rx.await.unwrap().unwrap(), json!(42));
    }

    #[test]
    fn test_unknown_id_is_discarded() {
        let table = PendingTable::new();
        assert!(!table.complete(InvocationId::new(), Ok(json!(null))));
    }

    #[test]
    fn test_cancel_then_complete_is_noop() {
        let table = PendingTable::new();
        let id = InvocationId::new();
        let _rx = table.register(id);
        assert!(table.cancel(id));
        assert!(!table.complete(id, Ok(json!(1))));
    }

    #[test]
    fn test_racing_claims_have_one_winner() {
        for _ in 0..200 {
            let table = Arc::new(PendingTable::new());
            let id = InvocationId::new();
            let _rx = table.register(id);

            let completer = {
                let table = table.clone();
                std::thread::spawn(move || table.complete(id, Ok(json!(1))))
            };
            let canceller = {
                let table = table.clone();
                std::thread::spawn(move || table.cancel(id))
            };

            let completed = completer.join().unwrap();
            let cancelled = canceller.join().unwrap();
            assert!(completed ^ cancelled, "exactly one claim must win");
        }
    }
}

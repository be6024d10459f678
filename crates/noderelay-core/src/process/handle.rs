//! Generation-tagged handle to one runtime process.

use crate::config::RuntimeConfig;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Liveness of a runtime process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState {
    Starting,
    Connected,
    /// Exited without being asked to.
    Failed,
    /// Stopped by the supervisor.
    Terminated,
}

impl ProcessState {
    /// Failed and Terminated are final.
    pub fn is_down(&self) -> bool {
        matches!(self, ProcessState::Failed | ProcessState::Terminated)
    }
}

/// One spawned runtime process.
///
/// The handle compares its own generation against the supervisor's shared
/// counter, so any holder can tell whether it has been superseded.
#[derive(Debug)]
pub struct RuntimeProcessHandle {
    generation: u64,
    pid: Option<u32>,
    endpoint: SocketAddr,
    state: watch::Sender<ProcessState>,
    current_generation: Arc<AtomicU64>,
}

impl RuntimeProcessHandle {
    pub(crate) fn new(
        generation: u64,
        pid: Option<u32>,
        endpoint: SocketAddr,
        current_generation: Arc<AtomicU64>,
    ) -> Self {
        let (state, _) = watch::channel(ProcessState::Starting);
        Self {
            generation,
            pid,
            endpoint,
            state,
            current_generation,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    pub fn state(&self) -> ProcessState {
        *self.state.borrow()
    }

    /// Whether this handle is still the supervisor's current one.
    pub fn is_current(&self) -> bool {
        self.current_generation.load(Ordering::SeqCst) == self.generation
    }

    /// Whether the process is connected and accepting invocations.
    pub fn is_connected(&self) -> bool {
        self.state() == ProcessState::Connected
    }

    /// URL invocations for this process are posted to.
    pub fn invoke_url(&self) -> String {
        format!("http://{}{}", self.endpoint, RuntimeConfig::INVOKE_PATH)
    }

    /// Move to a new state. Terminated is never left.
    pub(crate) fn set_state(&self, next: ProcessState) {
        self.state.send_if_modified(|state| {
            if *state == ProcessState::Terminated || *state == next {
                return false;
            }
            *state = next;
            true
        });
    }

    /// Resolve once the process is Failed or Terminated.
    pub async fn wait_down(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as self, so this cannot fail
        let _ = rx.wait_for(ProcessState::is_down).await;
    }
}

#[cfg(test)]
pub(crate) fn test_handle(generation: u64, endpoint: SocketAddr) -> (RuntimeProcessHandle, Arc<AtomicU64>) {
    let counter = Arc::new(AtomicU64::new(generation));
    let handle = RuntimeProcessHandle::new(generation, None, endpoint, counter.clone());
    handle.set_state(ProcessState::Connected);
    (handle, counter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn addr() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[test]
    fn test_is_current_tracks_counter() {
        let (handle, counter) = test_handle(3, addr());
        assert!(handle.is_current());
        counter.store(4, Ordering::SeqCst);
        assert!(!handle.is_current());
        assert_eq!(handle.invoke_url(), "http://127.0.0.1:4000/invoke");
    }

    #[test]
    fn test_terminated_is_final() {
        let (handle, _) = test_handle(1, addr());
        handle.set_state(ProcessState::Terminated);
        handle.set_state(ProcessState::Failed);
        assert_eq!(handle.state(), ProcessState::Terminated);
    }

    #[tokio::test]
    async fn test_wait_down() {
        let (handle, _) = test_handle(1, addr());
        let handle = Arc::new(handle);

        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.wait_down().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        handle.set_state(ProcessState::Failed);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}

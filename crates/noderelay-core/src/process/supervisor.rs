//! Runtime process supervisor.
//!
//! Owns the current runtime process and its generation number. Lifecycle
//! changes (start, restart, shutdown) are serialized by one async lock;
//! reading the current handle never waits on it.

use super::handle::{ProcessState, RuntimeProcessHandle};
use super::launcher::{RuntimeLauncher, RuntimeProcess};
use crate::config::RuntimeConfig;
use crate::error::{RelayError, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle notifications broadcast by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    Starting {
        generation: u64,
    },
    Ready {
        generation: u64,
        pid: Option<u32>,
        endpoint: SocketAddr,
    },
    /// The process exited without being asked to.
    ProcessExited {
        generation: u64,
        code: Option<i32>,
    },
    Restarting {
        generation: u64,
    },
    ShutDown,
}

/// The running process, its monitor task and the way to stop it.
struct Running {
    handle: Arc<RuntimeProcessHandle>,
    terminate_tx: Option<oneshot::Sender<()>>,
    monitor: JoinHandle<()>,
}

impl Running {
    /// Mark the handle terminated, stop the process and wait for it.
    async fn stop(mut self) {
        self.handle.set_state(ProcessState::Terminated);
        if let Some(tx) = self.terminate_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.monitor).await {
            warn!("Runtime monitor task failed: {}", e);
        }
    }
}

enum MonitorOutcome {
    Exited(Option<i32>),
    Terminate,
}

/// Supervises the runtime process.
pub struct ProcessSupervisor {
    launcher: Arc<dyn RuntimeLauncher>,
    startup_timeout: Duration,
    terminate_grace: Duration,
    current: RwLock<Option<Running>>,
    /// Generation of the current handle, 0 when there is none.
    current_generation: Arc<AtomicU64>,
    next_generation: AtomicU64,
    lifecycle: Mutex<()>,
    events: broadcast::Sender<SupervisorEvent>,
    shut_down: AtomicBool,
}

impl ProcessSupervisor {
    pub fn new(
        launcher: Arc<dyn RuntimeLauncher>,
        startup_timeout: Duration,
        terminate_grace: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(RuntimeConfig::EVENT_CHANNEL_CAPACITY);
        Self {
            launcher,
            startup_timeout,
            terminate_grace,
            current: RwLock::new(None),
            current_generation: Arc::new(AtomicU64::new(0)),
            next_generation: AtomicU64::new(1),
            lifecycle: Mutex::new(()),
            events,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }

    /// The current handle, if a process has been started.
    pub fn current_handle(&self) -> Option<Arc<RuntimeProcessHandle>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|running| running.handle.clone())
    }

    /// Generation of the current handle.
    pub fn current_generation(&self) -> Option<u64> {
        match self.current_generation.load(Ordering::SeqCst) {
            0 => None,
            generation => Some(generation),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Start a process, replacing nothing. Fails if one is already current.
    pub async fn start(&self) -> Result<Arc<RuntimeProcessHandle>> {
        let _guard = self.lifecycle.lock().await;
        self.ensure_open()?;
        if let Some(handle) = self.current_handle() {
            return Err(RelayError::start_failure(format!(
                "runtime generation {} is already running",
                handle.generation()
            )));
        }
        self.start_locked().await
    }

    /// Return a live handle, starting a process if there is none.
    ///
    /// A process that went down while nothing was in flight is replaced here,
    /// the same way a first start is. Callers racing on the same dead
    /// generation share one replacement.
    pub async fn ensure_started(&self) -> Result<Arc<RuntimeProcessHandle>> {
        self.ensure_open()?;
        if let Some(handle) = self.current_handle() {
            if !handle.state().is_down() {
                return Ok(handle);
            }
        }

        let _guard = self.lifecycle.lock().await;
        self.ensure_open()?;
        match self.current_handle() {
            Some(handle) if !handle.state().is_down() => Ok(handle),
            Some(handle) => {
                info!(
                    "Runtime generation {} is {:?}, replacing it before dispatch",
                    handle.generation(),
                    handle.state()
                );
                self.restart_locked().await
            }
            None => self.start_locked().await,
        }
    }

    /// Terminate the current process (if any) and start a new generation.
    pub async fn restart(&self) -> Result<Arc<RuntimeProcessHandle>> {
        let _guard = self.lifecycle.lock().await;
        self.ensure_open()?;
        self.restart_locked().await
    }

    /// Restart only if `generation` is still current.
    ///
    /// Concurrent callers that observed the same failed generation share one
    /// restart; later callers get the handle that replaced it.
    pub async fn restart_if_current(&self, generation: u64) -> Result<Arc<RuntimeProcessHandle>> {
        let _guard = self.lifecycle.lock().await;
        self.ensure_open()?;
        if let Some(handle) = self.current_handle() {
            if handle.generation() != generation {
                debug!(
                    "Generation {} already replaced by {}, skipping restart",
                    generation,
                    handle.generation()
                );
                return Ok(handle);
            }
        }
        self.restart_locked().await
    }

    /// Terminate the process and refuse further starts. Idempotent.
    pub async fn shutdown(&self) {
        let first = !self.shut_down.swap(true, Ordering::SeqCst);
        let _guard = self.lifecycle.lock().await;

        if let Some(running) = self.take_current() {
            info!(
                "Shutting down runtime generation {}",
                running.handle.generation()
            );
            running.stop().await;
        }

        if first {
            let _ = self.events.send(SupervisorEvent::ShutDown);
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_shut_down() {
            Err(RelayError::EngineUnavailable {
                attempts: 0,
                message: "engine has been shut down".to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn take_current(&self) -> Option<Running> {
        // Superseded handles must see themselves as stale before anything else
        self.current_generation.store(0, Ordering::SeqCst);
        self.current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    async fn restart_locked(&self) -> Result<Arc<RuntimeProcessHandle>> {
        if let Some(running) = self.take_current() {
            let generation = running.handle.generation();
            info!("Restarting runtime generation {}", generation);
            let _ = self.events.send(SupervisorEvent::Restarting { generation });
            running.stop().await;
        }
        self.start_locked().await
    }

    async fn start_locked(&self) -> Result<Arc<RuntimeProcessHandle>> {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let _ = self.events.send(SupervisorEvent::Starting { generation });
        info!("Starting runtime generation {}", generation);

        let mut process = self.launcher.launch().await?;

        let ready = tokio::time::timeout(self.startup_timeout, process.wait_ready()).await;
        let endpoint = match ready {
            Ok(Ok(endpoint)) => endpoint,
            Ok(Err(e)) => {
                warn!("Runtime generation {} failed to start: {}", generation, e);
                process.terminate(self.terminate_grace).await;
                return Err(e);
            }
            Err(_) => {
                warn!(
                    "Runtime generation {} not ready within {:?}",
                    generation, self.startup_timeout
                );
                process.terminate(self.terminate_grace).await;
                return Err(RelayError::StartupTimeout(self.startup_timeout));
            }
        };

        let pid = process.pid();
        let handle = Arc::new(RuntimeProcessHandle::new(
            generation,
            pid,
            endpoint,
            self.current_generation.clone(),
        ));
        handle.set_state(ProcessState::Connected);

        let (terminate_tx, terminate_rx) = oneshot::channel();
        let monitor = tokio::spawn(monitor_process(
            process,
            handle.clone(),
            terminate_rx,
            self.terminate_grace,
            self.events.clone(),
        ));

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Running {
            handle: handle.clone(),
            terminate_tx: Some(terminate_tx),
            monitor,
        });
        self.current_generation.store(generation, Ordering::SeqCst);

        info!(
            "Runtime generation {} ready at {} (PID {:?})",
            generation, endpoint, pid
        );
        let _ = self.events.send(SupervisorEvent::Ready {
            generation,
            pid,
            endpoint,
        });

        Ok(handle)
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        let running = self
            .current
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut running) = running {
            // The monitor task finishes termination on its own
            running.handle.set_state(ProcessState::Terminated);
            if let Some(tx) = running.terminate_tx.take() {
                let _ = tx.send(());
            }
        }
    }
}

/// Watch one process until it exits or is asked to stop.
async fn monitor_process(
    mut process: Box<dyn RuntimeProcess>,
    handle: Arc<RuntimeProcessHandle>,
    mut terminate_rx: oneshot::Receiver<()>,
    grace: Duration,
    events: broadcast::Sender<SupervisorEvent>,
) {
    let outcome = tokio::select! {
        code = process.wait_exit() => MonitorOutcome::Exited(code),
        _ = &mut terminate_rx => MonitorOutcome::Terminate,
    };

    match outcome {
        MonitorOutcome::Exited(code) => {
            if handle.state() == ProcessState::Terminated {
                debug!("Runtime generation {} exited during shutdown", handle.generation());
                return;
            }
            warn!(
                "Runtime generation {} exited unexpectedly (code {:?})",
                handle.generation(),
                code
            );
            handle.set_state(ProcessState::Failed);
            let _ = events.send(SupervisorEvent::ProcessExited {
                generation: handle.generation(),
                code,
            });
        }
        MonitorOutcome::Terminate => {
            let code = process.terminate(grace).await;
            debug!(
                "Runtime generation {} terminated (code {:?})",
                handle.generation(),
                code
            );
            handle.set_state(ProcessState::Terminated);
        }
    }
}

//! File system watcher that restarts the runtime when sources change.
//!
//! Events are filtered by extension and debounced: a burst of writes
//! produces one restart once the burst has been quiet for the debounce period.

use crate::error::{RelayError, Result};
use crate::process::ProcessSupervisor;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Restarts the runtime on relevant file changes. Stops when dropped.
pub struct RuntimeWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl RuntimeWatcher {
    /// Watch `paths` recursively.
    pub fn start(
        paths: &[PathBuf],
        extensions: Vec<String>,
        debounce: Duration,
        supervisor: Weak<ProcessSupervisor>,
    ) -> Result<Self> {
        let (event_tx, event_rx) = mpsc::unbounded_channel::<PathBuf>();
        let filter = ExtensionFilter::new(extensions);

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) if is_content_change(&event.kind) => {
                    for path in event.paths {
                        if filter.matches(&path) {
                            let _ = event_tx.send(path);
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("File watcher error: {}", e),
            }
        })
        .map_err(|e| RelayError::config("WatchPaths", format!("failed to create watcher: {}", e)))?;

        for path in paths {
            watcher.watch(path, RecursiveMode::Recursive).map_err(|e| {
                RelayError::config(
                    "WatchPaths",
                    format!("cannot watch {}: {}", path.display(), e),
                )
            })?;
            info!("Watching {} for runtime restarts", path.display());
        }

        let task = tokio::spawn(restart_on_changes(event_rx, debounce, supervisor));

        Ok(Self {
            _watcher: watcher,
            task,
        })
    }
}

impl Drop for RuntimeWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn restart_on_changes(
    mut events: mpsc::UnboundedReceiver<PathBuf>,
    debounce: Duration,
    supervisor: Weak<ProcessSupervisor>,
) {
    while let Some(first) = events.recv().await {
        debug!("Change detected: {}", first.display());

        // Swallow the rest of the burst
        loop {
            match tokio::time::timeout(debounce, events.recv()).await {
                Ok(Some(path)) => debug!("Change detected: {}", path.display()),
                Ok(None) => return,
                Err(_) => break,
            }
        }

        let Some(supervisor) = supervisor.upgrade() else {
            return;
        };
        if supervisor.is_shut_down() {
            return;
        }
        // Nothing to restart before the first invocation
        if supervisor.current_handle().is_none() {
            continue;
        }

        info!("Source files changed, restarting runtime");
        if let Err(e) = supervisor.restart().await {
            warn!("Runtime restart after file change failed: {}", e);
        }
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Matches paths by lowercase extension.
#[derive(Debug, Clone)]
struct ExtensionFilter {
    extensions: Vec<String>,
}

impl ExtensionFilter {
    fn new(extensions: Vec<String>) -> Self {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.extensions.iter().any(|e| *e == ext))
    }
}

//! Platform-specific process termination.
//!
//! On Unix the runtime gets SIGTERM first and SIGKILL once the grace period
//! runs out. Elsewhere the child is killed directly.

use crate::error::{RelayError, Result};
use std::time::Duration;
use tokio::process::Child;
use tracing::{debug, warn};

/// Ask a process to exit. Returns `false` if it was already gone.
pub fn request_termination(pid: u32) -> Result<bool> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let raw = i32::try_from(pid)
            .map_err(|_| RelayError::transport(format!("invalid pid {}", pid)))?;

        debug!("Sending SIGTERM to process {}", pid);
        match kill(Pid::from_raw(raw), Signal::SIGTERM) {
            Ok(()) => Ok(true),
            Err(nix::errno::Errno::ESRCH) => Ok(false),
            Err(e) => Err(RelayError::Io {
                message: format!("failed to send SIGTERM to {}: {}", pid, e),
                source: Some(std::io::Error::from(e)),
            }),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        Ok(false)
    }
}

/// Terminate a child: graceful signal, wait up to `grace`, then kill.
///
/// Returns the exit code if the process reported one.
pub async fn terminate_child(child: &mut Child, grace: Duration) -> Option<i32> {
    if let Ok(Some(status)) = child.try_wait() {
        return status.code();
    }

    let signalled = match child.id() {
        Some(pid) => match request_termination(pid) {
            Ok(sent) => sent,
            Err(e) => {
                warn!("{}", e);
                false
            }
        },
        None => false,
    };

    if signalled {
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                debug!("Process terminated gracefully ({})", status);
                return status.code();
            }
            Ok(Err(e)) => warn!("Failed to wait for process: {}", e),
            Err(_) => debug!("Process still running after {:?}, killing", grace),
        }
    }

    if let Err(e) = child.kill().await {
        debug!("kill failed (process probably already exited): {}", e);
    }
    match child.wait().await {
        Ok(status) => status.code(),
        Err(_) => None,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::time::Instant;
    use tokio::process::Command;

    fn spawn_sh(script: &str) -> Child {
        Command::new("sh")
            .args(["-c", script])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap()
    }

    #[tokio::test]
    async fn test_terminate_graceful() {
        let mut child = spawn_sh("exec sleep 30");
        let start = Instant::now();
        terminate_child(&mut child, Duration::from_secs(5)).await;
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(child.try_wait().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_terminate_escalates_to_kill() {
        let mut child = spawn_sh("trap '' TERM; while true; do sleep 1; done");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let start = Instant::now();
        terminate_child(&mut child, Duration::from_millis(300)).await;
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert!(child.try_wait().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_terminate_already_exited() {
        let mut child = spawn_sh("exit 3");
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            terminate_child(&mut child, Duration::from_secs(1)).await,
            Some(3)
        );
    }
}

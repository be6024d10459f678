//! Runtime process launching.
//!
//! [`RuntimeLauncher`] is the seam between the supervisor and whatever
//! actually runs JavaScript. [`NodeLauncher`] spawns a Node.js entry script
//! and waits for its readiness line on stdout.

use crate::config::RuntimeConfig;
use crate::error::{RelayError, Result};
use crate::platform;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

/// Target runtime output is logged under.
const RUNTIME_LOG_TARGET: &str = "noderelay::runtime";

/// Starts runtime processes.
#[async_trait]
pub trait RuntimeLauncher: Send + Sync + 'static {
    /// Spawn a new process. Readiness is awaited separately.
    async fn launch(&self) -> Result<Box<dyn RuntimeProcess>>;
}

/// A spawned runtime process owned by the supervisor.
#[async_trait]
pub trait RuntimeProcess: Send + 'static {
    fn pid(&self) -> Option<u32>;

    /// Wait for the readiness signal and return the endpoint.
    ///
    /// Fails with `ProcessStartFailure` if the process exits first.
    async fn wait_ready(&mut self) -> Result<SocketAddr>;

    /// Wait for the process to exit on its own.
    async fn wait_exit(&mut self) -> Option<i32>;

    /// Stop the process, forcefully once `grace` has passed.
    async fn terminate(&mut self, grace: Duration) -> Option<i32>;
}

/// Configuration for launching a Node.js runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeLauncherConfig {
    /// Executable to run.
    #[serde(rename = "Program")]
    pub program: PathBuf,
    /// Arguments, entry script first.
    #[serde(rename = "Args")]
    pub args: Vec<String>,
    #[serde(rename = "Env")]
    pub env_vars: HashMap<String, String>,
    #[serde(rename = "WorkingDirectory")]
    pub working_dir: Option<PathBuf>,
    /// Append `--parentPid <pid>` so the runtime can exit with its host.
    #[serde(rename = "PassParentPid")]
    pub pass_parent_pid: bool,
}

impl Default for NodeLauncherConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from(RuntimeConfig::DEFAULT_PROGRAM),
            args: Vec::new(),
            env_vars: HashMap::new(),
            working_dir: None,
            pass_parent_pid: true,
        }
    }
}

impl NodeLauncherConfig {
    /// Launch `node <entry>`.
    pub fn new(entry_script: impl Into<String>) -> Self {
        Self {
            args: vec![entry_script.into()],
            ..Self::default()
        }
    }

    /// Set the executable.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Add an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Replace all arguments.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    /// Set the working directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Enable or disable `--parentPid`.
    pub fn with_parent_pid(mut self, enable: bool) -> Self {
        self.pass_parent_pid = enable;
        self
    }

    /// Full argument list as passed to the program.
    pub fn command_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        if self.pass_parent_pid {
            args.push("--parentPid".to_string());
            args.push(std::process::id().to_string());
        }
        args
    }
}

/// Launches Node.js runtime processes.
#[derive(Debug, Clone)]
pub struct NodeLauncher {
    config: NodeLauncherConfig,
}

impl NodeLauncher {
    pub fn new(config: NodeLauncherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NodeLauncherConfig {
        &self.config
    }
}

#[async_trait]
impl RuntimeLauncher for NodeLauncher {
    async fn launch(&self) -> Result<Box<dyn RuntimeProcess>> {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(self.config.command_args());
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.config.env_vars {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!("Launching runtime: {}", self.config.program.display());

        let mut child = cmd.spawn().map_err(|e| RelayError::ProcessStartFailure {
            message: format!("failed to spawn {}: {}", self.config.program.display(), e),
            source: Some(e),
        })?;

        let pid = child.id();
        debug!("Spawned runtime process with PID {:?}", pid);

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(BufReader::new(stderr).lines(), true));
        }
        let stdout = child.stdout.take().map(|out| BufReader::new(out).lines());

        Ok(Box::new(NodeProcess { child, pid, stdout }))
    }
}

/// A Node.js process spawned by [`NodeLauncher`].
struct NodeProcess {
    child: Child,
    pid: Option<u32>,
    stdout: Option<Lines<BufReader<ChildStdout>>>,
}

#[async_trait]
impl RuntimeProcess for NodeProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    async fn wait_ready(&mut self) -> Result<SocketAddr> {
        let mut lines = self
            .stdout
            .take()
            .ok_or_else(|| RelayError::start_failure("runtime stdout is not captured"))?;

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(endpoint) = line.trim().strip_prefix(RuntimeConfig::READY_PREFIX) {
                        let endpoint = parse_endpoint(endpoint)?;
                        tokio::spawn(forward_lines(lines, false));
                        return Ok(endpoint);
                    }
                    info!(target: RUNTIME_LOG_TARGET, "{}", line);
                }
                Ok(None) => break,
                Err(e) => {
                    return Err(RelayError::ProcessStartFailure {
                        message: "failed to read runtime stdout".to_string(),
                        source: Some(e),
                    })
                }
            }
        }

        let status = match self.child.wait().await {
            Ok(status) => status.to_string(),
            Err(e) => e.to_string(),
        };
        Err(RelayError::start_failure(format!(
            "runtime exited before signalling readiness ({})",
            status
        )))
    }

    async fn wait_exit(&mut self) -> Option<i32> {
        match self.child.wait().await {
            Ok(status) => status.code(),
            Err(e) => {
                warn!("Failed to wait for runtime process: {}", e);
                None
            }
        }
    }

    async fn terminate(&mut self, grace: Duration) -> Option<i32> {
        platform::terminate_child(&mut self.child, grace).await
    }
}

/// Parse `<ip>:<port>`, or a bare port on loopback.
pub fn parse_endpoint(text: &str) -> Result<SocketAddr> {
    let text = text.trim();
    if let Ok(addr) = text.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(port) = text.parse::<u16>() {
        return Ok(SocketAddr::from((Ipv4Addr::LOCALHOST, port)));
    }
    Err(RelayError::start_failure(format!(
        "invalid readiness endpoint: {:?}",
        text
    )))
}

async fn forward_lines<R>(mut lines: Lines<BufReader<R>>, is_stderr: bool)
where
    R: AsyncRead + Unpin,
{
    while let Ok(Some(line)) = lines.next_line().await {
        if is_stderr {
            warn!(target: RUNTIME_LOG_TARGET, "{}", line);
        } else {
            info!(target: RUNTIME_LOG_TARGET, "{}", line);
        }
    }
}

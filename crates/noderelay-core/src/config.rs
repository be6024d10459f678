//! Centralized configuration for noderelay.
//!
//! Constants live on [`RuntimeConfig`]; the user-facing knobs live on
//! [`EngineOptions`], which deserializes from the PascalCase JSON shape
//! (`TimeoutMS`, `MaxRetries`, `StartupTimeoutMS`, ...).

use crate::error::{RelayError, Result};
use crate::recovery::BackoffPolicy;
use crate::timeout::EffectiveTimeout;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runtime and transport constants.
pub struct RuntimeConfig;

impl RuntimeConfig {
    /// Added to every non-infinite timeout to absorb transport round trips.
    pub const FIXED_TIMEOUT_OVERHEAD: Duration = Duration::from_millis(1000);
    /// Configured timeout value meaning "wait forever".
    pub const INFINITE_TIMEOUT_MS: i64 = -1;

    pub const DEFAULT_TIMEOUT_MS: i64 = 60_000;
    pub const DEFAULT_MAX_RETRIES: u32 = 1;
    pub const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 60_000;
    pub const DEFAULT_TERMINATE_GRACE_MS: u64 = 2_000;
    pub const DEFAULT_WATCH_DEBOUNCE_MS: u64 = 300;
    pub const DEFAULT_WATCH_EXTENSIONS: &'static [&'static str] = &["js", "mjs", "cjs", "json"];

    /// Line prefix the runtime prints on stdout once it accepts connections.
    pub const READY_PREFIX: &'static str = "NODERELAY_LISTENING=";
    /// HTTP path invocations are posted to.
    pub const INVOKE_PATH: &'static str = "/invoke";
    pub const USER_AGENT: &'static str = "noderelay/0.1";
    pub const DEFAULT_PROGRAM: &'static str = "node";
    /// Capacity of the supervisor event channel.
    pub const EVENT_CHANNEL_CAPACITY: usize = 64;
}

/// Engine options, the configuration surface consumed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Per-invocation timeout; `-1` waits forever.
    #[serde(rename = "TimeoutMS")]
    pub timeout_ms: i64,
    /// Restart-triggered retries allowed per invocation.
    #[serde(rename = "MaxRetries")]
    pub max_retries: u32,
    /// How long a spawned runtime may take to signal readiness.
    #[serde(rename = "StartupTimeoutMS")]
    pub startup_timeout_ms: u64,
    /// Grace period between SIGTERM and SIGKILL.
    #[serde(rename = "TerminateGraceMS")]
    pub terminate_grace_ms: u64,
    /// Delay policy between restart attempts.
    #[serde(rename = "Backoff")]
    pub backoff: BackoffPolicy,
    /// Paths whose changes restart the runtime. Empty disables watching.
    #[serde(rename = "WatchPaths")]
    pub watch_paths: Vec<PathBuf>,
    /// File extensions (without dot) that count as relevant changes.
    #[serde(rename = "WatchExtensions")]
    pub watch_extensions: Vec<String>,
    #[serde(rename = "WatchDebounceMS")]
    pub watch_debounce_ms: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            timeout_ms: RuntimeConfig::DEFAULT_TIMEOUT_MS,
            max_retries: RuntimeConfig::DEFAULT_MAX_RETRIES,
            startup_timeout_ms: RuntimeConfig::DEFAULT_STARTUP_TIMEOUT_MS,
            terminate_grace_ms: RuntimeConfig::DEFAULT_TERMINATE_GRACE_MS,
            backoff: BackoffPolicy::default(),
            watch_paths: Vec::new(),
            watch_extensions: RuntimeConfig::DEFAULT_WATCH_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            watch_debounce_ms: RuntimeConfig::DEFAULT_WATCH_DEBOUNCE_MS,
        }
    }
}

impl EngineOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from JSON text. Missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| RelayError::config("options", e.to_string()))
    }

    /// Load options from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            RelayError::config("options", format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    /// Set the invocation timeout in milliseconds (`-1` for infinite).
    pub fn with_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the maximum number of restart-triggered retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the startup timeout in milliseconds.
    pub fn with_startup_timeout_ms(mut self, startup_timeout_ms: u64) -> Self {
        self.startup_timeout_ms = startup_timeout_ms;
        self
    }

    /// Set the termination grace period in milliseconds.
    pub fn with_terminate_grace_ms(mut self, grace_ms: u64) -> Self {
        self.terminate_grace_ms = grace_ms;
        self
    }

    /// Set the backoff policy between restart attempts.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Add a path to watch for changes.
    pub fn with_watch_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.watch_paths.push(path.into());
        self
    }

    /// Startup timeout as a duration.
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    /// Termination grace period as a duration.
    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }

    /// Watch debounce as a duration.
    pub fn watch_debounce(&self) -> Duration {
        Duration::from_millis(self.watch_debounce_ms)
    }

    /// Validate every field and return the effective invocation timeout.
    ///
    /// Called once when the engine is built, so a bad value fails
    /// construction rather than the first invocation.
    pub fn validate(&self) -> Result<EffectiveTimeout> {
        let timeout = EffectiveTimeout::from_configured_ms(self.timeout_ms)?;

        if self.startup_timeout_ms == 0 {
            return Err(RelayError::config(
                "StartupTimeoutMS",
                "must be greater than zero",
            ));
        }

        self.backoff.validate()?;

        if !self.watch_paths.is_empty() && self.watch_extensions.is_empty() {
            return Err(RelayError::config(
                "WatchExtensions",
                "must not be empty when WatchPaths is set",
            ));
        }

        Ok(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let options = EngineOptions::default();
        assert_eq!(options.timeout_ms, 60_000);
        assert_eq!(options.max_retries, 1);
        assert_eq!(
            options.validate().unwrap(),
            EffectiveTimeout::Bounded(Duration::from_millis(61_000))
        );
    }

    #[test]
    fn test_parse_pascal_case_keys() {
        let options = EngineOptions::from_json_str(
            r#"{ "TimeoutMS": -1, "MaxRetries": 3, "StartupTimeoutMS": 5000 }"#,
        )
        .unwrap();

        assert_eq!(options.timeout_ms, -1);
        assert_eq!(options.max_retries, 3);
        assert_eq!(options.startup_timeout(), Duration::from_secs(5));
        // Unspecified keys keep their defaults
        assert_eq!(options.terminate_grace_ms, RuntimeConfig::DEFAULT_TERMINATE_GRACE_MS);
        assert_eq!(options.validate().unwrap(), EffectiveTimeout::Infinite);
    }

    #[test]
    fn test_negative_max_retries_is_config_error() {
        let err = EngineOptions::from_json_str(r#"{ "MaxRetries": -1 }"#).unwrap_err();
        assert!(matches!(err, RelayError::Configuration { .. }));
    }

    #[test]
    fn test_invalid_timeout_rejected_at_validation() {
        let err = EngineOptions::new().with_timeout_ms(-2).validate().unwrap_err();
        match err {
            RelayError::Configuration { field, .. } => assert_eq!(field, "TimeoutMS"),
            other => panic!("Expected Configuration, got: {:?}", other),
        }
    }

    #[test]
    fn test_zero_startup_timeout_rejected() {
        let err = EngineOptions::new()
            .with_startup_timeout_ms(0)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("StartupTimeoutMS"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("noderelay.json");
        std::fs::write(&path, r#"{ "TimeoutMS": 0 }"#).unwrap();

        let options = EngineOptions::from_file(&path).unwrap();
        assert_eq!(options.timeout_ms, 0);

        let missing = EngineOptions::from_file(dir.path().join("missing.json"));
        assert!(matches!(missing, Err(RelayError::Configuration { .. })));
    }
}

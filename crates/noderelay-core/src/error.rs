//! Error types for noderelay.
//!
//! Every invocation ends in exactly one outcome. Internal kinds
//! (`StaleGeneration`, `TransportUnavailable` and the start failures seen
//! during recovery) are absorbed by the recovery controller; the rest reach
//! the caller unchanged.

use std::time::Duration;
use thiserror::Error;

/// Main error type for the invocation engine.
#[derive(Debug, Error)]
pub enum RelayError {
    // Configuration errors
    #[error("Configuration error for {field}: {message}")]
    Configuration { field: String, message: String },

    // Process lifecycle errors
    #[error("Runtime process failed to start: {message}")]
    ProcessStartFailure {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Runtime process did not signal readiness within {0:?}")]
    StartupTimeout(Duration),

    #[error("Runtime generation {generation} is no longer current")]
    StaleGeneration { generation: u64 },

    // Transport errors
    #[error("Runtime transport unavailable: {message}")]
    TransportUnavailable { message: String },

    #[error("Invocation timed out after {0:?}")]
    InvocationTimeout(Duration),

    #[error("Invalid response from runtime: {message}")]
    Protocol { message: String },

    // Remote errors
    #[error("JavaScript error: {message}")]
    RemoteExecution {
        message: String,
        /// Remote stack trace, passed through untouched.
        stack: Option<String>,
    },

    #[error("Module not cached in runtime: {key}")]
    ModuleNotCached { key: String },

    // Terminal engine errors
    #[error("Invocation cancelled")]
    Cancelled,

    #[error("Engine unavailable after {attempts} recovery attempts: {message}")]
    EngineUnavailable { attempts: u32, message: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

/// Result type alias for noderelay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Coarse error kinds, used for classification and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    ProcessStartFailure,
    StartupTimeout,
    StaleGeneration,
    TransportUnavailable,
    InvocationTimeout,
    Protocol,
    RemoteExecution,
    ModuleNotCached,
    Cancelled,
    EngineUnavailable,
    Serialization,
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RelayError::Protocol {
                message: err.to_string(),
            }
        } else {
            RelayError::TransportUnavailable {
                message: err.to_string(),
            }
        }
    }
}

impl RelayError {
    /// Create a configuration error for a named field.
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        RelayError::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a start failure without an underlying IO error.
    pub fn start_failure(message: impl Into<String>) -> Self {
        RelayError::ProcessStartFailure {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transport failure.
    pub fn transport(message: impl Into<String>) -> Self {
        RelayError::TransportUnavailable {
            message: message.into(),
        }
    }

    /// Get the coarse kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::Configuration { .. } => ErrorKind::Configuration,
            RelayError::ProcessStartFailure { .. } => ErrorKind::ProcessStartFailure,
            RelayError::StartupTimeout(_) => ErrorKind::StartupTimeout,
            RelayError::StaleGeneration { .. } => ErrorKind::StaleGeneration,
            RelayError::TransportUnavailable { .. } => ErrorKind::TransportUnavailable,
            RelayError::InvocationTimeout(_) => ErrorKind::InvocationTimeout,
            RelayError::Protocol { .. } => ErrorKind::Protocol,
            RelayError::RemoteExecution { .. } => ErrorKind::RemoteExecution,
            RelayError::ModuleNotCached { .. } => ErrorKind::ModuleNotCached,
            RelayError::Cancelled => ErrorKind::Cancelled,
            RelayError::EngineUnavailable { .. } => ErrorKind::EngineUnavailable,
            RelayError::Json { .. } | RelayError::Io { .. } => ErrorKind::Serialization,
        }
    }

    /// Check if this error is handled by the recovery controller and must
    /// never be returned from `invoke`.
    pub fn is_internal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::StaleGeneration | ErrorKind::TransportUnavailable
        )
    }

    /// Check if this error ends an invocation without any recovery.
    pub fn is_terminal(&self) -> bool {
        !self.is_internal()
            && !matches!(
                self.kind(),
                ErrorKind::ProcessStartFailure | ErrorKind::StartupTimeout
            )
    }

    /// Convert to a process exit code for the CLI.
    ///
    /// - 2: configuration error
    /// - 3: JavaScript error or cache miss
    /// - 4: invocation timeout
    /// - 5: engine unavailable (start failures, exhausted retries)
    /// - 6: cancelled
    /// - 1: anything else
    pub fn to_exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Configuration => 2,
            ErrorKind::RemoteExecution | ErrorKind::ModuleNotCached => 3,
            ErrorKind::InvocationTimeout => 4,
            ErrorKind::EngineUnavailable
            | ErrorKind::ProcessStartFailure
            | ErrorKind::StartupTimeout => 5,
            ErrorKind::Cancelled => 6,
            _ => 1,
        }
    }
}

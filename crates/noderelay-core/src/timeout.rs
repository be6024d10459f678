//! Timeout policy.
//!
//! Maps a configured millisecond value to the duration callers actually wait.
//! `-1` means no timeout; any other non-negative value gets a fixed overhead
//! added for the HTTP round trip and runtime bookkeeping.

use crate::config::RuntimeConfig;
use crate::error::{RelayError, Result};
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// The effective wait applied to one invocation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectiveTimeout {
    /// Wait until the runtime answers or the caller cancels.
    Infinite,
    /// Wait at most this long.
    Bounded(Duration),
}

impl EffectiveTimeout {
    /// Map a configured timeout to its effective value.
    ///
    /// Values below `-1` are rejected with a configuration error.
    pub fn from_configured_ms(configured_ms: i64) -> Result<Self> {
        match configured_ms {
            RuntimeConfig::INFINITE_TIMEOUT_MS => Ok(EffectiveTimeout::Infinite),
            ms if ms >= 0 => Ok(EffectiveTimeout::Bounded(
                Duration::from_millis(ms as u64) + RuntimeConfig::FIXED_TIMEOUT_OVERHEAD,
            )),
            ms => Err(RelayError::config(
                "TimeoutMS",
                format!("must be -1 or non-negative, got {}", ms),
            )),
        }
    }

    /// The bounded duration, or `None` when infinite.
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            EffectiveTimeout::Infinite => None,
            EffectiveTimeout::Bounded(duration) => Some(*duration),
        }
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, EffectiveTimeout::Infinite)
    }

    /// Run a future under this timeout. `Err(duration)` means it elapsed.
    pub async fn run<F: Future>(&self, future: F) -> std::result::Result<F::Output, Duration> {
        match self {
            EffectiveTimeout::Infinite => Ok(future.await),
            EffectiveTimeout::Bounded(duration) => tokio::time::timeout(*duration, future)
                .await
                .map_err(|_| *duration),
        }
    }
}

impl fmt::Display for EffectiveTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectiveTimeout::Infinite => write!(f, "infinite"),
            EffectiveTimeout::Bounded(duration) => write!(f, "{}ms", duration.as_millis()),
        }
    }
}

/// Free-function form of [`EffectiveTimeout::from_configured_ms`].
pub fn effective_timeout(configured_ms: i64) -> Result<EffectiveTimeout> {
    EffectiveTimeout::from_configured_ms(configured_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minus_one_is_infinite() {
        assert_eq!(effective_timeout(-1).unwrap(), EffectiveTimeout::Infinite);
        assert!(effective_timeout(-1).unwrap().as_duration().is_none());
    }

    #[test]
    fn test_non_negative_adds_overhead() {
        for (configured, expected_ms) in [(0, 1000), (1000, 2000), (250, 1250), (60_000, 61_000)] {
            assert_eq!(
                effective_timeout(configured).unwrap(),
                EffectiveTimeout::Bounded(Duration::from_millis(expected_ms)),
                "configured {}",
                configured
            );
        }
    }

    #[test]
    fn test_below_minus_one_rejected() {
        for configured in [-2, -1000, i64::MIN] {
            let err = effective_timeout(configured).unwrap_err();
            assert!(matches!(err, RelayError::Configuration { .. }));
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(EffectiveTimeout::Infinite.to_string(), "infinite");
        assert_eq!(effective_timeout(0).unwrap().to_string(), "1000ms");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_bounded_elapses() {
        let timeout = effective_timeout(0).unwrap();
        let result = timeout
            .run(tokio::time::sleep(Duration::from_millis(2000)))
            .await;
        assert_eq!(result, Err(Duration::from_millis(1000)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_infinite_waits() {
        let result = EffectiveTimeout::Infinite
            .run(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                7
            })
            .await;
        assert_eq!(result, Ok(7));
    }
}

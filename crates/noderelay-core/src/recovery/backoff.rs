//! Delay policy between recovery attempts.
//!
//! Exponential delays grow by `multiplier` per attempt up to `max_delay_ms`,
//! with an optional random factor between 0.5x and 1.5x.

use crate::error::{RelayError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff policy, deserialized from `{"Fixed": {...}}` or `{"Exponential": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BackoffPolicy {
    Fixed {
        #[serde(rename = "DelayMS")]
        delay_ms: u64,
    },
    Exponential {
        #[serde(rename = "BaseDelayMS")]
        base_delay_ms: u64,
        #[serde(rename = "MaxDelayMS")]
        max_delay_ms: u64,
        #[serde(rename = "Multiplier", default = "default_multiplier")]
        multiplier: f64,
        #[serde(rename = "Jitter", default)]
        jitter: bool,
    },
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Exponential {
            base_delay_ms: 100,
            max_delay_ms: 5_000,
            multiplier: default_multiplier(),
            jitter: true,
        }
    }
}

impl BackoffPolicy {
    /// A fixed delay between attempts.
    pub fn fixed(delay: Duration) -> Self {
        BackoffPolicy::Fixed {
            delay_ms: delay.as_millis() as u64,
        }
    }

    /// No delay at all. Mostly useful in tests.
    pub fn none() -> Self {
        BackoffPolicy::Fixed { delay_ms: 0 }
    }

    /// Exponential backoff without jitter.
    pub fn exponential(base: Duration, max: Duration) -> Self {
        BackoffPolicy::Exponential {
            base_delay_ms: base.as_millis() as u64,
            max_delay_ms: max.as_millis() as u64,
            multiplier: default_multiplier(),
            jitter: false,
        }
    }

    /// Enable or disable jitter. No-op for fixed delays.
    pub fn with_jitter(mut self, enabled: bool) -> Self {
        if let BackoffPolicy::Exponential { jitter, .. } = &mut self {
            *jitter = enabled;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            BackoffPolicy::Fixed { .. } => Ok(()),
            BackoffPolicy::Exponential {
                base_delay_ms,
                max_delay_ms,
                multiplier,
                ..
            } => {
                if !multiplier.is_finite() || *multiplier < 1.0 {
                    return Err(RelayError::config(
                        "Backoff.Multiplier",
                        format!("must be a finite value >= 1.0, got {}", multiplier),
                    ));
                }
                if base_delay_ms > max_delay_ms {
                    return Err(RelayError::config(
                        "Backoff.BaseDelayMS",
                        format!(
                            "must not exceed MaxDelayMS ({} > {})",
                            base_delay_ms, max_delay_ms
                        ),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Delay before the given recovery attempt (0-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            BackoffPolicy::Fixed { delay_ms } => Duration::from_millis(*delay_ms),
            BackoffPolicy::Exponential {
                base_delay_ms,
                max_delay_ms,
                multiplier,
                jitter,
            } => {
                let max_secs = *max_delay_ms as f64 / 1000.0;
                let grown = (*base_delay_ms as f64 / 1000.0)
                    * multiplier.powi(attempt.min(i32::MAX as u32) as i32);
                let capped = grown.min(max_secs);

                let secs = if *jitter {
                    let factor = rand::rng().random_range(0.5..1.5);
                    (capped * factor).min(max_secs)
                } else {
                    capped
                };

                Duration::from_secs_f64(secs.max(0.0))
            }
        }
    }
}

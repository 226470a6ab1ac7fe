//! Execution limits for pipeline stages: timeouts, polling cadence and retries.
//!
//! Loaded from the `limits:` section of the config file; every field has a
//! default so the section may be partial or absent.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::Stage;

/// Timeouts and retry settings for a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    /// Per-attempt timeout for request/response stages (default: 120s)
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_seconds: u64,

    /// How long to wait on a provider-side job: video render or
    /// upload processing (default: 900s = 15 min)
    #[serde(default = "default_render_timeout")]
    pub render_timeout_seconds: u64,

    /// Delay between job status polls (default: 10s)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,

    /// Retry policy for transient failures
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_stage_timeout() -> u64 {
    120
}
fn default_render_timeout() -> u64 {
    900
}
fn default_poll_interval() -> u64 {
    10
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            stage_timeout_seconds: default_stage_timeout(),
            render_timeout_seconds: default_render_timeout(),
            poll_interval_seconds: default_poll_interval(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Limits {
    /// Timeout for one attempt of a stage.
    ///
    /// Video and publish attempts poll a provider job internally, so their
    /// budget is the job wait plus the plain request budget.
    pub fn stage_timeout(&self, stage: Stage) -> Duration {
        let seconds = match stage {
            Stage::Topic | Stage::Script => self.stage_timeout_seconds,
            Stage::Video | Stage::Publish => {
                self.render_timeout_seconds + self.stage_timeout_seconds
            }
        };
        Duration::from_secs(seconds)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds.max(1))
    }

    /// Effective retry policy for a stage. Publishing is attempted once so a
    /// lost response can never produce a duplicate post.
    pub fn retry_for(&self, stage: Stage) -> RetryPolicy {
        match stage {
            Stage::Publish => RetryPolicy {
                max_attempts: 1,
                ..self.retry.clone()
            },
            _ => self.retry.clone(),
        }
    }
}

/// Retry policy for failed stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including first try)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay between retries in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier (delay *= multiplier after each retry)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    30000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Calculate delay for a specific attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::from_millis(self.initial_delay_ms);
        }

        let delay = self.initial_delay_ms as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);

        let capped = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(capped)
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.stage_timeout(Stage::Topic), Duration::from_secs(120));
        assert_eq!(limits.stage_timeout(Stage::Video), Duration::from_secs(1020));
        assert_eq!(limits.render_timeout(), Duration::from_secs(900));
        assert_eq!(limits.poll_interval(), Duration::from_secs(10));
    }

    #[test]
    fn test_poll_interval_never_zero() {
        let limits = Limits {
            poll_interval_seconds: 0,
            ..Default::default()
        };
        assert_eq!(limits.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_publish_is_never_retried() {
        let limits = Limits {
            retry: RetryPolicy {
                max_attempts: 5,
                ..Default::default()
            },
            ..Default::default()
        };

        assert_eq!(limits.retry_for(Stage::Script).max_attempts, 5);
        assert!(!limits.retry_for(Stage::Publish).should_retry(1));
    }

    #[test]
    fn test_retry_policy_delays() {
        let policy = RetryPolicy {
            initial_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 10000,
            ..Default::default()
        };

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(8000));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(10000)); // Capped
    }

    #[test]
    fn test_retry_should_retry() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..Default::default()
        };

        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!RetryPolicy::none().should_retry(1));
    }

    #[test]
    fn test_limits_yaml_parsing() {
        let yaml = r#"
stage_timeout_seconds: 30
retry:
  max_attempts: 4
  initial_delay_ms: 500
  backoff_multiplier: 1.5
"#;
        let limits: Limits = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(limits.stage_timeout_seconds, 30);
        assert_eq!(limits.render_timeout_seconds, 900);
        assert_eq!(limits.retry.max_attempts, 4);
        assert_eq!(limits.retry.initial_delay_ms, 500);
        assert_eq!(limits.retry.max_delay_ms, 30000);
        assert_eq!(limits.retry.backoff_multiplier, 1.5);
    }
}

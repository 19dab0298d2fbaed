//! Bounded polling of an asynchronous external job.
//!
//! The loop makes at most `floor(timeout / interval)` attempts. Each attempt
//! sleeps one interval and then queries once, so the effective timeout is
//! `attempts * interval`.

use leclient::{JobState, JobStatusReport};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

/// Default interval between status queries in seconds
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Default wall-clock polling budget in seconds
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 3600;

/// Interval and budget of a polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingPolicy {
    interval: Duration,
    timeout: Duration,
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
        }
    }
}

impl PollingPolicy {
    /// Create a policy
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidPolicy` for a zero interval
    pub fn new(interval: Duration, timeout: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(PipelineError::InvalidPolicy(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(Self { interval, timeout })
    }

    /// Create a policy from whole seconds
    pub fn from_secs(interval_secs: u64, timeout_secs: u64) -> Result<Self> {
        Self::new(
            Duration::from_secs(interval_secs),
            Duration::from_secs(timeout_secs),
        )
    }

    /// Sleep before each attempt
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Configured wall-clock budget
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of attempts the budget allows
    pub fn max_attempts(&self) -> u32 {
        let attempts = self.timeout.as_nanos() / self.interval.as_nanos();
        u32::try_from(attempts).unwrap_or(u32::MAX)
    }
}

/// How a polling loop ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollResult {
    /// Job reported completion
    Completed {
        /// Finished video, if reported
        video_ref: Option<String>,
    },
    /// Job reported definitive failure
    Failed,
    /// Attempt budget exhausted
    TimedOut,
}

/// Result of a polling loop with diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOutcome {
    /// Terminal result
    pub result: PollResult,
    /// Attempts made, including the deciding one
    pub attempts: u32,
    /// Attempts whose query itself failed
    pub query_errors: u32,
    /// Most recent query error
    pub last_error: Option<String>,
}

/// Runs a status query until the job is terminal or the budget runs out
#[derive(Debug, Clone, Copy)]
pub struct PollingMonitor {
    policy: PollingPolicy,
}

impl PollingMonitor {
    /// Create a monitor
    pub fn new(policy: PollingPolicy) -> Self {
        Self { policy }
    }

    /// Policy in use
    pub fn policy(&self) -> &PollingPolicy {
        &self.policy
    }

    /// Poll `query` until it reports a terminal job state.
    ///
    /// `query` receives the 1-based attempt number. A query error counts as
    /// an in-progress attempt and is kept for diagnostics.
    pub async fn watch<F, Fut>(&self, mut query: F) -> PollOutcome
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = leclient::Result<JobStatusReport>>,
    {
        let max_attempts = self.policy.max_attempts();
        let mut query_errors = 0;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            tokio::time::sleep(self.policy.interval).await;

            match query(attempt).await {
                Ok(report) => match report.state() {
                    JobState::Completed { video_ref } => {
                        debug!(attempt, "Job completed");
                        return PollOutcome {
                            result: PollResult::Completed { video_ref },
                            attempts: attempt,
                            query_errors,
                            last_error,
                        };
                    }
                    JobState::Failed => {
                        debug!(attempt, "Job failed");
                        return PollOutcome {
                            result: PollResult::Failed,
                            attempts: attempt,
                            query_errors,
                            last_error,
                        };
                    }
                    JobState::InProgress(status) => {
                        debug!(attempt, max_attempts, status = %status, "Job still in progress");
                    }
                },
                Err(err) => {
                    warn!(attempt, max_attempts, error = %err, "Job status query failed");
                    query_errors += 1;
                    last_error = Some(err.to_string());
                }
            }
        }

        PollOutcome {
            result: PollResult::TimedOut,
            attempts: max_attempts,
            query_errors,
            last_error,
        }
    }
}

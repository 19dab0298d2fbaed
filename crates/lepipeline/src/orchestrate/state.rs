use leclient::Stage;
use lestockage::{InteractionId, InteractionStatus};
use serde::{Deserialize, Serialize};

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every stage succeeded and the video job completed.
    Completed,
    /// Perception left no transcribed text.
    NoTranscription,
    /// A mandatory stage failed.
    StageFailed {
        /// Failing stage.
        stage: Stage,
        /// Collaborator error message.
        reason: String,
    },
    /// Reading or writing the interaction failed.
    StoreFailed {
        /// Store error message.
        reason: String,
    },
    /// The video job reported failure.
    JobFailed,
    /// The video job never reached a terminal status.
    TimedOut {
        /// Status queries made.
        attempts: u32,
    },
}

impl RunOutcome {
    /// Persisted status for this outcome.
    pub fn status(&self) -> InteractionStatus {
        match self {
            RunOutcome::Completed => InteractionStatus::Completed,
            RunOutcome::NoTranscription => InteractionStatus::FailedNoTranscription,
            RunOutcome::StageFailed { .. } | RunOutcome::StoreFailed { .. } => {
                InteractionStatus::FailedOrchestration
            }
            RunOutcome::JobFailed | RunOutcome::TimedOut { .. } => InteractionStatus::Failed,
        }
    }

    /// Diagnostic stored next to a failure status.
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            RunOutcome::Completed => None,
            RunOutcome::NoTranscription => {
                Some("perception produced no transcribed text".to_string())
            }
            RunOutcome::StageFailed { stage, reason } => {
                Some(format!("{} stage failed: {}", stage, reason))
            }
            RunOutcome::StoreFailed { reason } => Some(format!("store error: {}", reason)),
            RunOutcome::JobFailed => Some("video job reported failure".to_string()),
            RunOutcome::TimedOut { attempts } => Some(format!(
                "video job still unfinished after {} status queries",
                attempts
            )),
        }
    }
}

/// Output of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Interaction the run drove.
    pub interaction_id: InteractionId,
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Stages invoked, in order. Status queries are counted in `poll_attempts`.
    pub stages_executed: Vec<Stage>,
    /// Status queries made while watching the video job.
    pub poll_attempts: u32,
    /// Status queries that failed outright.
    pub poll_query_errors: u32,
    /// Absorbed memory extraction failure, if any.
    pub memory_error: Option<String>,
    /// Whether this run wrote the terminal status.
    pub status_written: bool,
}

impl RunReport {
    pub(crate) fn new(interaction_id: InteractionId) -> Self {
        Self {
            interaction_id,
            outcome: RunOutcome::Completed,
            stages_executed: Vec::new(),
            poll_attempts: 0,
            poll_query_errors: 0,
            memory_error: None,
            status_written: false,
        }
    }

    /// Terminal status this run decided on.
    pub fn status(&self) -> InteractionStatus {
        self.outcome.status()
    }

    /// Whether `stage` was invoked.
    pub fn executed(&self, stage: Stage) -> bool {
        self.stages_executed.contains(&stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(RunOutcome::Completed, InteractionStatus::Completed)]
    #[case(RunOutcome::NoTranscription, InteractionStatus::FailedNoTranscription)]
    #[case(
        RunOutcome::StageFailed { stage: Stage::Vocal, reason: "down".to_string() },
        InteractionStatus::FailedOrchestration
    )]
    #[case(
        RunOutcome::StoreFailed { reason: "locked".to_string() },
        InteractionStatus::FailedOrchestration
    )]
    #[case(RunOutcome::JobFailed, InteractionStatus::Failed)]
    #[case(RunOutcome::TimedOut { attempts: 360 }, InteractionStatus::Failed)]
    fn outcome_maps_to_status(#[case] outcome: RunOutcome, #[case] status: InteractionStatus) {
        assert_eq!(outcome.status(), status);
        assert_eq!(outcome.failure_reason().is_none(), status == InteractionStatus::Completed);
    }

    #[test]
    fn report_serializes_outcome_tag() {
        let mut report = RunReport::new(InteractionId(9));
        report.outcome = RunOutcome::TimedOut { attempts: 3 };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["interaction_id"], 9);
        assert_eq!(json["outcome"]["kind"], "timed_out");
        assert_eq!(json["outcome"]["attempts"], 3);
    }
}

//! Pipeline error types

use leclient::{CollaboratorError, Stage};
use lestockage::StoreError;
use thiserror::Error;

/// Errors that abort a pipeline run.
///
/// None of these escape `Orchestrator::run`; each is converted into a
/// terminal interaction status.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Reading or writing the interaction failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A mandatory stage failed
    #[error("Stage {stage} failed: {source}")]
    Stage {
        /// Stage that failed
        stage: Stage,
        /// Collaborator error
        #[source]
        source: CollaboratorError,
    },

    /// A store call on the blocking pool panicked or was cancelled
    #[error("Store task failed: {0}")]
    StoreTask(#[from] tokio::task::JoinError),

    /// Polling parameters cannot produce a bounded loop
    #[error("Invalid polling policy: {0}")]
    InvalidPolicy(String),
}

impl PipelineError {
    /// Stage the error came from, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

//! Collaborator error types

use thiserror::Error;

use crate::types::Stage;

/// Errors returned by a collaborator call.
///
/// The orchestrator only distinguishes success from failure; the split
/// between `Remote` and `Transport` exists for diagnostics.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// Collaborator answered, but with a non-2xx status or a body that could
    /// not be decoded
    #[error("{stage} collaborator returned {status}: {message}")]
    Remote {
        /// Stage that made the call
        stage: Stage,
        /// HTTP status code of the answer
        status: u16,
        /// Response excerpt or decoding error
        message: String,
    },

    /// Collaborator could not be reached or did not answer in time
    #[error("{stage} collaborator unreachable: {message}")]
    Transport {
        /// Stage that made the call
        stage: Stage,
        /// Underlying transport error
        message: String,
        /// Whether the stage timeout elapsed
        timed_out: bool,
    },

    /// Client could not be built from its configuration
    #[error("Collaborator misconfiguration: {0}")]
    Misconfiguration(String),
}

impl CollaboratorError {
    /// Create a remote error
    pub fn remote(stage: Stage, status: u16, message: impl Into<String>) -> Self {
        CollaboratorError::Remote {
            stage,
            status,
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(stage: Stage, message: impl Into<String>, timed_out: bool) -> Self {
        CollaboratorError::Transport {
            stage,
            message: message.into(),
            timed_out,
        }
    }

    /// Stage the error belongs to, if it came from a call
    pub fn stage(&self) -> Option<Stage> {
        match self {
            CollaboratorError::Remote { stage, .. } | CollaboratorError::Transport { stage, .. } => {
                Some(*stage)
            }
            CollaboratorError::Misconfiguration(_) => None,
        }
    }

    /// Check if the stage timeout elapsed
    pub fn is_timeout(&self) -> bool {
        matches!(self, CollaboratorError::Transport { timed_out: true, .. })
    }
}

/// Result type for collaborator calls.
pub type Result<T> = std::result::Result<T, CollaboratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_display() {
        let err = CollaboratorError::remote(Stage::Content, 503, "overloaded");
        assert_eq!(err.to_string(), "content collaborator returned 503: overloaded");
        assert_eq!(err.stage(), Some(Stage::Content));
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_transport_timeout() {
        let err = CollaboratorError::transport(Stage::Perception, "deadline elapsed", true);
        assert!(err.is_timeout());
        assert!(err.to_string().starts_with("perception collaborator unreachable"));
    }

    #[test]
    fn test_misconfiguration_has_no_stage() {
        let err = CollaboratorError::Misconfiguration("bad url".to_string());
        assert_eq!(err.stage(), None);
    }
}

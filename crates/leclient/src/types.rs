//! Request and response payloads exchanged with collaborators.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One collaborator operation of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Transcription and affect analysis of audio/video input
    Perception,
    /// Response text generation
    Content,
    /// Best-effort memory extraction
    MemoryExtraction,
    /// Speech synthesis
    Vocal,
    /// Starting the video job
    Embodiment,
    /// Querying the video job status
    JobStatus,
}

impl Stage {
    /// Stable name used in logs and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Perception => "perception",
            Stage::Content => "content",
            Stage::MemoryExtraction => "memory_extraction",
            Stage::Vocal => "vocal",
            Stage::Embodiment => "embodiment",
            Stage::JobStatus => "job_status",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of every stage request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRequest {
    /// Interaction the collaborator should work on
    pub interaction_id: i64,
}

/// Content stage output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentOutput {
    /// Unadapted model answer
    pub raw_content_response: String,
    /// Persona-adapted answer
    pub final_response_text: String,
}

/// Who an extracted fact is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactScope {
    /// The user of the session
    User,
    /// The persona of the session
    Avatar,
}

/// One fact returned by memory extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedMemory {
    /// Who the fact is about
    pub scope: FactScope,
    /// Fact key
    pub key: String,
    /// Fact value
    pub value: String,
}

/// Memory extraction output; an absent list means nothing was extracted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryExtraction {
    /// Extracted facts
    #[serde(default)]
    pub memories: Vec<ExtractedMemory>,
}

/// Vocal stage output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocalOutput {
    /// Object-storage key of the synthesized audio, when reported
    #[serde(default, alias = "generated_audio_key")]
    pub audio_ref: Option<String>,
}

/// Handle of a started video job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbodimentJob {
    /// External job identifier
    #[serde(alias = "heygen_video_id")]
    pub job_handle: String,
}

/// Raw job status answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusReport {
    /// Collaborator-defined status string
    pub status: String,
    /// Object-storage key of the finished video, when reported
    #[serde(default, alias = "generated_video_key")]
    pub video_ref: Option<String>,
}

/// Classified job status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// Job finished
    Completed {
        /// Finished video, if the collaborator reported one
        video_ref: Option<String>,
    },
    /// Job failed definitively
    Failed,
    /// Anything else; the raw status is kept for logging
    InProgress(String),
}

impl JobStatusReport {
    /// Classify the raw status string
    pub fn state(&self) -> JobState {
        let status = self.status.trim();
        if status.eq_ignore_ascii_case("completed") {
            JobState::Completed {
                video_ref: self.video_ref.clone(),
            }
        } else if status.eq_ignore_ascii_case("failed") {
            JobState::Failed
        } else {
            JobState::InProgress(status.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn report(status: &str) -> JobStatusReport {
        JobStatusReport {
            status: status.to_string(),
            video_ref: None,
        }
    }

    #[rstest]
    #[case("completed")]
    #[case("COMPLETED")]
    #[case(" completed ")]
    fn test_completed_classification(#[case] status: &str) {
        assert_eq!(report(status).state(), JobState::Completed { video_ref: None });
    }

    #[rstest]
    #[case("processing")]
    #[case("pending")]
    #[case("")]
    fn test_unknown_status_is_in_progress(#[case] status: &str) {
        assert!(matches!(report(status).state(), JobState::InProgress(_)));
    }

    #[test]
    fn test_failed_classification() {
        assert_eq!(report("failed").state(), JobState::Failed);
    }

    #[test]
    fn test_legacy_field_names() {
        let job: EmbodimentJob = serde_json::from_str(r#"{"heygen_video_id": "abc"}"#).unwrap();
        assert_eq!(job.job_handle, "abc");

        let status: JobStatusReport =
            serde_json::from_str(r#"{"status": "completed", "generated_video_key": "v.mp4"}"#)
                .unwrap();
        assert_eq!(
            status.state(),
            JobState::Completed {
                video_ref: Some("v.mp4".to_string())
            }
        );

        let vocal: VocalOutput =
            serde_json::from_str(r#"{"generated_audio_key": "a.mp3", "message": "ok"}"#).unwrap();
        assert_eq!(vocal.audio_ref.as_deref(), Some("a.mp3"));
    }

    #[test]
    fn test_memory_extraction_defaults_to_empty() {
        let parsed: MemoryExtraction = serde_json::from_str("{}").unwrap();
        assert!(parsed.memories.is_empty());
    }
}

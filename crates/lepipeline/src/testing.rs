//! Scripted collaborator doubles for pipeline tests.

use async_trait::async_trait;
use leclient::{
    CollaboratorError, Collaborators, ContentCollaborator, ContentOutput, EmbodimentCollaborator,
    EmbodimentJob, ExtractedMemory, FactScope, JobStatusReport, MemoryCollaborator,
    MemoryExtraction, PerceptionCollaborator, Stage, VocalCollaborator, VocalOutput,
};
use lestockage::{InteractionId, InteractionRepository, InteractionStore};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

/// One scripted answer of the job status query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusStep {
    /// Answer with this status string
    Status(String),
    /// Answer with a completed status and a video reference
    CompletedWith(String),
    /// Fail the query at the transport level
    Unreachable,
}

impl StatusStep {
    /// Answer with `status`
    pub fn status(status: &str) -> Self {
        StatusStep::Status(status.to_string())
    }
}

/// Collaborators that answer from a script and record every call.
///
/// Unscripted stages succeed. Once the status script is exhausted every
/// further query reports `processing`.
pub struct ScriptedCollaborators {
    perception_store: Option<InteractionStore>,
    transcription: Option<String>,
    failing: HashSet<Stage>,
    memories: Vec<ExtractedMemory>,
    audio_ref: Option<String>,
    job_handle: String,
    statuses: Mutex<VecDeque<StatusStep>>,
    calls: Mutex<Vec<Stage>>,
    status_handles: Mutex<Vec<Option<String>>>,
}

impl Default for ScriptedCollaborators {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedCollaborators {
    /// Every stage succeeds; the job never finishes
    pub fn new() -> Self {
        Self {
            perception_store: None,
            transcription: None,
            failing: HashSet::new(),
            memories: Vec::new(),
            audio_ref: None,
            job_handle: "job-1".to_string(),
            statuses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            status_handles: Mutex::new(Vec::new()),
        }
    }

    /// Perception writes `transcription` into `store`, as the real service does
    pub fn with_transcription(mut self, store: InteractionStore, transcription: Option<&str>) -> Self {
        self.perception_store = Some(store);
        self.transcription = transcription.map(str::to_string);
        self
    }

    /// Make `stage` fail with a transport error
    pub fn failing(mut self, stage: Stage) -> Self {
        self.failing.insert(stage);
        self
    }

    /// Facts returned by memory extraction
    pub fn with_memories(mut self, memories: Vec<(FactScope, &str, &str)>) -> Self {
        self.memories = memories
            .into_iter()
            .map(|(scope, key, value)| ExtractedMemory {
                scope,
                key: key.to_string(),
                value: value.to_string(),
            })
            .collect();
        self
    }

    /// Audio reference returned by the vocal stage
    pub fn with_audio_ref(mut self, audio_ref: &str) -> Self {
        self.audio_ref = Some(audio_ref.to_string());
        self
    }

    /// Handle returned when the video job starts
    pub fn with_job_handle(mut self, job_handle: &str) -> Self {
        self.job_handle = job_handle.to_string();
        self
    }

    /// Answers of successive status queries
    pub fn with_statuses(self, steps: impl IntoIterator<Item = StatusStep>) -> Self {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(steps);
        self
    }

    /// Report `processing` until attempt `k`, then `completed` with `video_ref`
    pub fn completing_on_attempt(self, k: usize, video_ref: &str) -> Self {
        let mut steps = vec![StatusStep::status("processing"); k.saturating_sub(1)];
        steps.push(StatusStep::CompletedWith(video_ref.to_string()));
        self.with_statuses(steps)
    }

    /// Wrap into the bundle the orchestrator takes
    pub fn into_collaborators(self: Arc<Self>) -> Collaborators {
        Collaborators::uniform(self)
    }

    /// Stages called so far, in order
    pub fn calls(&self) -> Vec<Stage> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of calls made to `stage`
    pub fn call_count(&self, stage: Stage) -> usize {
        self.calls().iter().filter(|s| **s == stage).count()
    }

    /// Job handles passed to each status query
    pub fn status_handles(&self) -> Vec<Option<String>> {
        self.status_handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn enter(&self, stage: Stage) -> leclient::Result<()> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(stage);
        if self.failing.contains(&stage) {
            return Err(CollaboratorError::transport(stage, "scripted failure", false));
        }
        Ok(())
    }
}

#[async_trait]
impl PerceptionCollaborator for ScriptedCollaborators {
    async fn analyze(&self, interaction_id: i64) -> leclient::Result<()> {
        self.enter(Stage::Perception)?;
        if let Some(store) = &self.perception_store {
            store
                .record_perception(
                    InteractionId(interaction_id),
                    self.transcription.as_deref(),
                    Some("The user appears neutral."),
                )
                .map_err(|e| CollaboratorError::remote(Stage::Perception, 500, e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ContentCollaborator for ScriptedCollaborators {
    async fn generate_response(&self, interaction_id: i64) -> leclient::Result<ContentOutput> {
        self.enter(Stage::Content)?;
        Ok(ContentOutput {
            raw_content_response: format!("raw response {}", interaction_id),
            final_response_text: format!("final response {}", interaction_id),
        })
    }
}

#[async_trait]
impl MemoryCollaborator for ScriptedCollaborators {
    async fn extract_memories(&self, _interaction_id: i64) -> leclient::Result<MemoryExtraction> {
        self.enter(Stage::MemoryExtraction)?;
        Ok(MemoryExtraction {
            memories: self.memories.clone(),
        })
    }
}

#[async_trait]
impl VocalCollaborator for ScriptedCollaborators {
    async fn synthesize(&self, _interaction_id: i64) -> leclient::Result<VocalOutput> {
        self.enter(Stage::Vocal)?;
        Ok(VocalOutput {
            audio_ref: self.audio_ref.clone(),
        })
    }
}

#[async_trait]
impl EmbodimentCollaborator for ScriptedCollaborators {
    async fn start_video(&self, _interaction_id: i64) -> leclient::Result<EmbodimentJob> {
        self.enter(Stage::Embodiment)?;
        Ok(EmbodimentJob {
            job_handle: self.job_handle.clone(),
        })
    }

    async fn job_status(
        &self,
        _interaction_id: i64,
        job_handle: Option<&str>,
    ) -> leclient::Result<JobStatusReport> {
        self.enter(Stage::JobStatus)?;
        self.status_handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(job_handle.map(str::to_string));

        let step = self
            .statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| StatusStep::status("processing"));

        match step {
            StatusStep::Status(status) => Ok(JobStatusReport {
                status,
                video_ref: None,
            }),
            StatusStep::CompletedWith(video_ref) => Ok(JobStatusReport {
                status: "completed".to_string(),
                video_ref: Some(video_ref),
            }),
            StatusStep::Unreachable => Err(CollaboratorError::transport(
                Stage::JobStatus,
                "status endpoint unreachable",
                false,
            )),
        }
    }
}

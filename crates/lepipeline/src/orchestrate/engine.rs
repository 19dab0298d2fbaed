use std::future::Future;
use std::sync::Arc;

use leclient::{Collaborators, FactScope, Stage};
use lestockage::{InteractionId, InteractionRepository, MemoryScope, NewMemory};
use tracing::{debug, error, info, warn};

use crate::error::{PipelineError, Result};
use crate::polling::{PollResult, PollingMonitor};

use super::{
    context::PipelineContext,
    state::{RunOutcome, RunReport},
};

/// Drives one interaction through perception, content, memory extraction,
/// vocal synthesis, and the video job.
///
/// Stages run strictly in order and each result is committed before the next
/// stage starts. Every run ends by attempting exactly one terminal status
/// write.
pub struct Orchestrator {
    store: Arc<dyn InteractionRepository>,
    collaborators: Collaborators,
    context: PipelineContext,
}

impl Orchestrator {
    /// Create an orchestrator.
    pub fn new(
        store: Arc<dyn InteractionRepository>,
        collaborators: Collaborators,
        context: PipelineContext,
    ) -> Self {
        Self {
            store,
            collaborators,
            context,
        }
    }

    /// Runtime configuration in use.
    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Run the pipeline for one interaction.
    ///
    /// Never fails: every error becomes a terminal status on the record and
    /// is reflected in the returned report.
    pub async fn run(&self, id: InteractionId) -> RunReport {
        let mut report = RunReport::new(id);
        info!(interaction_id = %id, "Starting pipeline run");

        let driven = self.drive(id, &mut report).await;
        report.outcome = match driven {
            Ok(outcome) => outcome,
            Err(PipelineError::Stage { stage, source }) => {
                error!(interaction_id = %id, stage = %stage, error = %source, "Mandatory stage failed");
                RunOutcome::StageFailed {
                    stage,
                    reason: source.to_string(),
                }
            }
            Err(err) => {
                error!(interaction_id = %id, error = %err, "Pipeline run aborted");
                RunOutcome::StoreFailed {
                    reason: err.to_string(),
                }
            }
        };

        report.status_written = self.finish(id, &report.outcome).await;
        report
    }

    async fn drive(&self, id: InteractionId, report: &mut RunReport) -> Result<RunOutcome> {
        let interaction = self.with_store(move |s| s.get(id)).await?;

        if interaction.needs_perception() {
            self.stage(report, Stage::Perception, self.collaborators.perception.analyze(id.0))
                .await?;

            let perceived = self.with_store(move |s| s.get(id)).await?;
            if !perceived.has_transcription() {
                warn!(interaction_id = %id, "Perception produced no transcription");
                return Ok(RunOutcome::NoTranscription);
            }
        } else {
            debug!(interaction_id = %id, "Text-only input, skipping perception");
        }

        let content = self
            .stage(
                report,
                Stage::Content,
                self.collaborators.content.generate_response(id.0),
            )
            .await?;
        self.with_store(move |s| {
            s.record_content(
                id,
                &content.raw_content_response,
                &content.final_response_text,
            )
        })
        .await?;

        report.memory_error = self.extract_memories(id, report).await;

        let vocal = self
            .stage(report, Stage::Vocal, self.collaborators.vocal.synthesize(id.0))
            .await?;
        if let Some(audio_ref) = vocal.audio_ref {
            self.with_store(move |s| s.record_audio(id, &audio_ref)).await?;
        }

        let job = self
            .stage(
                report,
                Stage::Embodiment,
                self.collaborators.embodiment.start_video(id.0),
            )
            .await?;
        let job_handle = job.job_handle;
        let handle = job_handle.clone();
        self.with_store(move |s| s.record_video_job(id, &handle)).await?;
        info!(interaction_id = %id, job_handle = %job_handle, "Video job started");

        let embodiment = self.collaborators.embodiment.clone();
        let poll = PollingMonitor::new(self.context.polling)
            .watch(|_attempt| {
                let embodiment = embodiment.clone();
                let job_handle = job_handle.clone();
                async move { embodiment.job_status(id.0, Some(&job_handle)).await }
            })
            .await;

        report.poll_attempts = poll.attempts;
        report.poll_query_errors = poll.query_errors;

        match poll.result {
            PollResult::Completed { video_ref } => {
                if let Some(video_ref) = video_ref {
                    self.with_store(move |s| s.record_video(id, &video_ref)).await?;
                }
                info!(interaction_id = %id, attempts = poll.attempts, "Video job completed");
                Ok(RunOutcome::Completed)
            }
            PollResult::Failed => {
                warn!(interaction_id = %id, attempts = poll.attempts, "Video job failed");
                Ok(RunOutcome::JobFailed)
            }
            PollResult::TimedOut => {
                warn!(
                    interaction_id = %id,
                    attempts = poll.attempts,
                    query_errors = poll.query_errors,
                    last_error = ?poll.last_error,
                    "Video job timed out"
                );
                Ok(RunOutcome::TimedOut {
                    attempts: poll.attempts,
                })
            }
        }
    }

    async fn stage<T>(
        &self,
        report: &mut RunReport,
        stage: Stage,
        call: impl Future<Output = leclient::Result<T>>,
    ) -> Result<T> {
        report.stages_executed.push(stage);
        debug!(interaction_id = %report.interaction_id, stage = %stage, "Running stage");
        call.await
            .map_err(|source| PipelineError::Stage { stage, source })
    }

    /// Best-effort: returns the absorbed error instead of failing the run.
    async fn extract_memories(&self, id: InteractionId, report: &mut RunReport) -> Option<String> {
        report.stages_executed.push(Stage::MemoryExtraction);

        let extraction = match self.collaborators.memory.extract_memories(id.0).await {
            Ok(extraction) => extraction,
            Err(err) => {
                warn!(interaction_id = %id, error = %err, "Memory extraction failed, continuing");
                return Some(err.to_string());
            }
        };

        let facts: Vec<NewMemory> = extraction
            .memories
            .into_iter()
            .map(|m| NewMemory::new(memory_scope(m.scope), m.key, m.value))
            .collect();

        match self.with_store(move |s| s.append_memories(id, &facts)).await {
            Ok(count) => {
                debug!(interaction_id = %id, count, "Memories appended");
                None
            }
            Err(err) => {
                warn!(interaction_id = %id, error = %err, "Persisting memories failed, continuing");
                Some(err.to_string())
            }
        }
    }

    /// Run one synchronous store call on the blocking pool.
    async fn with_store<T, F>(&self, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn InteractionRepository) -> lestockage::Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let value = tokio::task::spawn_blocking(move || call(store.as_ref())).await??;
        Ok(value)
    }

    /// Write the terminal status. Returns whether this run wrote it.
    async fn finish(&self, id: InteractionId, outcome: &RunOutcome) -> bool {
        let status = outcome.status();
        let reason = outcome.failure_reason();

        match self
            .with_store(move |s| s.mark_terminal(id, status, reason.as_deref()))
            .await
        {
            Ok(true) => {
                info!(interaction_id = %id, status = %status, "Pipeline run finished");
                true
            }
            Ok(false) => {
                warn!(interaction_id = %id, status = %status, "Interaction already terminal, status left unchanged");
                false
            }
            Err(err) => {
                error!(interaction_id = %id, status = %status, error = %err, "Failed to write terminal status");
                false
            }
        }
    }
}

fn memory_scope(scope: FactScope) -> MemoryScope {
    match scope {
        FactScope::User => MemoryScope::User,
        FactScope::Avatar => MemoryScope::Avatar,
    }
}

//! One trait per collaborator.
//!
//! Every operation takes only the interaction id: collaborators read their
//! inputs from shared storage and the orchestrator persists what they return.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{ContentOutput, EmbodimentJob, JobStatusReport, MemoryExtraction, VocalOutput};

/// Transcribes audio/video input and summarizes perceived affect.
///
/// Output is written to storage by the collaborator itself.
#[async_trait]
pub trait PerceptionCollaborator: Send + Sync {
    /// Analyze the input of an interaction
    async fn analyze(&self, interaction_id: i64) -> Result<()>;
}

/// Generates the response text of a turn
#[async_trait]
pub trait ContentCollaborator: Send + Sync {
    /// Produce raw and persona-adapted response text
    async fn generate_response(&self, interaction_id: i64) -> Result<ContentOutput>;
}

/// Extracts memory facts from a finished exchange
#[async_trait]
pub trait MemoryCollaborator: Send + Sync {
    /// Extract zero or more facts
    async fn extract_memories(&self, interaction_id: i64) -> Result<MemoryExtraction>;
}

/// Synthesizes speech for the response text
#[async_trait]
pub trait VocalCollaborator: Send + Sync {
    /// Synthesize audio
    async fn synthesize(&self, interaction_id: i64) -> Result<VocalOutput>;
}

/// Renders the talking-head video as an asynchronous external job
#[async_trait]
pub trait EmbodimentCollaborator: Send + Sync {
    /// Start the video job
    async fn start_video(&self, interaction_id: i64) -> Result<EmbodimentJob>;

    /// Query the job status once
    async fn job_status(
        &self,
        interaction_id: i64,
        job_handle: Option<&str>,
    ) -> Result<JobStatusReport>;
}

/// The full set of collaborators a pipeline run needs
#[derive(Clone)]
pub struct Collaborators {
    /// Perception
    pub perception: Arc<dyn PerceptionCollaborator>,
    /// Content
    pub content: Arc<dyn ContentCollaborator>,
    /// Memory extraction
    pub memory: Arc<dyn MemoryCollaborator>,
    /// Vocal
    pub vocal: Arc<dyn VocalCollaborator>,
    /// Embodiment
    pub embodiment: Arc<dyn EmbodimentCollaborator>,
}

impl Collaborators {
    /// Use one value for every collaborator
    pub fn uniform<T>(all: Arc<T>) -> Self
    where
        T: PerceptionCollaborator
            + ContentCollaborator
            + MemoryCollaborator
            + VocalCollaborator
            + EmbodimentCollaborator
            + 'static,
    {
        Self {
            perception: all.clone(),
            content: all.clone(),
            memory: all.clone(),
            vocal: all.clone(),
            embodiment: all,
        }
    }
}

//! HTTP implementation of every collaborator over one shared `reqwest::Client`.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{CollaboratorKind, CollaboratorsConfig};
use crate::error::{CollaboratorError, Result};
use crate::traits::{
    ContentCollaborator, EmbodimentCollaborator, MemoryCollaborator, PerceptionCollaborator,
    VocalCollaborator,
};
use crate::types::{
    ContentOutput, EmbodimentJob, JobStatusReport, MemoryExtraction, Stage, StageRequest,
    VocalOutput,
};

/// Connect timeout applied to every collaborator
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest response excerpt kept in a remote error
const MAX_ERROR_BODY: usize = 512;

/// Collaborator clients backed by HTTP.
///
/// Calls are made exactly once; nothing is retried here.
#[derive(Clone)]
pub struct HttpCollaborators {
    client: Client,
    config: CollaboratorsConfig,
}

impl HttpCollaborators {
    /// Build clients for the given endpoints
    ///
    /// # Errors
    ///
    /// Returns `CollaboratorError::Misconfiguration` if an endpoint is invalid
    /// or the HTTP client cannot be constructed
    pub fn new(config: CollaboratorsConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .use_rustls_tls()
            .build()
            .map_err(|e| {
                CollaboratorError::Misconfiguration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client, config })
    }

    /// Endpoints in use
    pub fn config(&self) -> &CollaboratorsConfig {
        &self.config
    }

    async fn post_stage(
        &self,
        kind: CollaboratorKind,
        stage: Stage,
        path: &str,
        interaction_id: i64,
    ) -> Result<Response> {
        let endpoint = self.config.endpoint(kind);
        let request = self
            .client
            .post(endpoint.url(path))
            .json(&StageRequest { interaction_id });
        execute(request, stage, endpoint.timeout(), interaction_id).await
    }
}

/// Send once with the stage timeout and map failures
async fn execute(
    request: RequestBuilder,
    stage: Stage,
    timeout: Duration,
    interaction_id: i64,
) -> Result<Response> {
    debug!(
        stage = %stage,
        interaction_id,
        timeout_secs = timeout.as_secs(),
        "Calling collaborator"
    );

    let response = request
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| map_transport_error(stage, &e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(stage = %stage, interaction_id, status = status.as_u16(), "Collaborator returned error status");
        return Err(CollaboratorError::remote(
            stage,
            status.as_u16(),
            excerpt(&body),
        ));
    }

    Ok(response)
}

/// Decode a JSON body, treating an undecodable body as a remote error
async fn decode<T: DeserializeOwned>(stage: Stage, response: Response) -> Result<T> {
    let status = response.status().as_u16();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| map_transport_error(stage, &e))?;
    serde_json::from_slice(&bytes).map_err(|e| {
        CollaboratorError::remote(stage, status, format!("malformed response body: {}", e))
    })
}

/// Like `decode`, but an empty body yields the default payload
async fn decode_or_default<T: DeserializeOwned + Default>(
    stage: Stage,
    response: Response,
) -> Result<T> {
    let status = response.status().as_u16();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| map_transport_error(stage, &e))?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(&bytes).map_err(|e| {
        CollaboratorError::remote(stage, status, format!("malformed response body: {}", e))
    })
}

fn map_transport_error(stage: Stage, error: &reqwest::Error) -> CollaboratorError {
    CollaboratorError::transport(stage, error.to_string(), error.is_timeout())
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= MAX_ERROR_BODY {
        return trimmed.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

#[async_trait]
impl PerceptionCollaborator for HttpCollaborators {
    async fn analyze(&self, interaction_id: i64) -> Result<()> {
        self.post_stage(
            CollaboratorKind::Perception,
            Stage::Perception,
            "analyze",
            interaction_id,
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ContentCollaborator for HttpCollaborators {
    async fn generate_response(&self, interaction_id: i64) -> Result<ContentOutput> {
        let response = self
            .post_stage(
                CollaboratorKind::Content,
                Stage::Content,
                "generate-response",
                interaction_id,
            )
            .await?;
        decode(Stage::Content, response).await
    }
}

#[async_trait]
impl MemoryCollaborator for HttpCollaborators {
    async fn extract_memories(&self, interaction_id: i64) -> Result<MemoryExtraction> {
        let response = self
            .post_stage(
                CollaboratorKind::Memory,
                Stage::MemoryExtraction,
                "extract-memories",
                interaction_id,
            )
            .await?;
        decode_or_default(Stage::MemoryExtraction, response).await
    }
}

#[async_trait]
impl VocalCollaborator for HttpCollaborators {
    async fn synthesize(&self, interaction_id: i64) -> Result<VocalOutput> {
        let response = self
            .post_stage(CollaboratorKind::Vocal, Stage::Vocal, "synthesize", interaction_id)
            .await?;
        decode_or_default(Stage::Vocal, response).await
    }
}

#[async_trait]
impl EmbodimentCollaborator for HttpCollaborators {
    async fn start_video(&self, interaction_id: i64) -> Result<EmbodimentJob> {
        let response = self
            .post_stage(
                CollaboratorKind::Embodiment,
                Stage::Embodiment,
                "generate",
                interaction_id,
            )
            .await?;
        decode(Stage::Embodiment, response).await
    }

    async fn job_status(
        &self,
        interaction_id: i64,
        job_handle: Option<&str>,
    ) -> Result<JobStatusReport> {
        let endpoint = self.config.endpoint(CollaboratorKind::Embodiment);
        let mut request = self
            .client
            .get(endpoint.url(&format!("status/{}", interaction_id)));
        if let Some(handle) = job_handle {
            request = request.query(&[("job_handle", handle)]);
        }

        let response = execute(
            request,
            Stage::JobStatus,
            self.config.status_timeout(),
            interaction_id,
        )
        .await?;
        decode(Stage::JobStatus, response).await
    }
}

//! HTTP handlers for REST API endpoints

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use leclient::Collaborators;
use lepipeline::{Orchestrator, PipelineContext, PipelineScheduler};
use lestockage::{
    InteractionId, InteractionRepository, InteractionStore, NewInteraction, SessionStore,
    SharedStorage,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::{ApiError, ApiResult};
use crate::responses::{
    HealthResponse, InteractionResponse, OrchestrateResponse, SessionInteractionsResponse,
};

/// Body of the trigger endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestrateRequest {
    /// Session the turn belongs to
    pub session_id: i64,

    /// Raw text input
    #[serde(default)]
    pub input_text: Option<String>,

    /// Object-storage key of an audio input
    #[serde(default, alias = "input_audio_s3_key")]
    pub input_audio_ref: Option<String>,

    /// Object-storage key of a video input
    #[serde(default, alias = "input_video_s3_key")]
    pub input_video_ref: Option<String>,
}

impl From<OrchestrateRequest> for NewInteraction {
    fn from(req: OrchestrateRequest) -> Self {
        NewInteraction {
            session_id: req.session_id,
            input_text: req.input_text,
            input_audio_ref: req.input_audio_ref,
            input_video_ref: req.input_video_ref,
        }
    }
}

/// State shared across all handlers
///
/// Storage access is synchronous and short; handlers never hold the storage
/// lock across an `.await`.
#[derive(Clone)]
pub struct AppState {
    /// Interaction records
    pub interactions: InteractionStore,

    /// Session context
    pub sessions: SessionStore,

    /// Launches pipeline runs
    pub scheduler: PipelineScheduler,

    /// Immutable server configuration
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Wire stores, orchestrator, and scheduler around shared storage
    pub fn new(
        storage: SharedStorage,
        collaborators: Collaborators,
        config: ServerConfig,
    ) -> ApiResult<Self> {
        let polling = config
            .polling
            .policy()
            .map_err(|e| ApiError::internal(format!("Invalid config: {}", e)))?;

        let interactions = InteractionStore::new(storage.clone());
        let orchestrator = Orchestrator::new(
            Arc::new(interactions.clone()),
            collaborators,
            PipelineContext::new(polling),
        );

        Ok(Self {
            interactions,
            sessions: SessionStore::new(storage),
            scheduler: PipelineScheduler::new(Arc::new(orchestrator)),
            config: Arc::new(config),
        })
    }
}

/// POST /orchestrate - Create an interaction and start its pipeline run
pub async fn orchestrate(
    State(state): State<AppState>,
    Json(request): Json<OrchestrateRequest>,
) -> ApiResult<Json<OrchestrateResponse>> {
    let new: NewInteraction = request.into();
    if new.input_text.is_none() && new.input_audio_ref.is_none() && new.input_video_ref.is_none() {
        warn!(session_id = new.session_id, "Orchestration requested without any input");
    }

    let interaction = state.interactions.create(&new)?;
    let id = interaction.interaction_id;
    info!(interaction_id = %id, session_id = new.session_id, "Interaction created");

    if state.scheduler.schedule(id).is_none() {
        // The active run owns the record and writes its terminal status.
        warn!(interaction_id = %id, "Pipeline run already active, not scheduling another");
    }

    Ok(Json(OrchestrateResponse::started(id)))
}

/// GET /interactions/:id - Current state of one interaction
pub async fn get_interaction(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> ApiResult<Json<InteractionResponse>> {
    let interaction = state.interactions.get(InteractionId(id))?;
    Ok(Json(interaction.into()))
}

/// GET /sessions/:id/interactions - All interactions of a session
pub async fn list_session_interactions(
    Path(session_id): Path<i64>,
    State(state): State<AppState>,
) -> ApiResult<Json<SessionInteractionsResponse>> {
    state.sessions.get_session(session_id)?;
    let interactions = state.interactions.list_for_session(session_id)?;
    Ok(Json(SessionInteractionsResponse::new(session_id, interactions)))
}

/// GET /health - Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "leserve".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_runs: state.scheduler.active_count(),
    })
}

/// Create router with all API endpoints, served both at the root and under `/v1`
pub fn create_router() -> Router<AppState> {
    let api = Router::new()
        .route("/orchestrate", post(orchestrate))
        .route("/interactions/:id", get(get_interaction))
        .route("/sessions/:id/interactions", get(list_session_interactions))
        .route("/health", get(health_check));

    Router::new().merge(api.clone()).nest("/v1", api)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accepts_storage_key_aliases() {
        let request: OrchestrateRequest = serde_json::from_str(
            r#"{"session_id": 3, "input_audio_s3_key": "uploads/a.wav"}"#,
        )
        .unwrap();
        let new = NewInteraction::from(request);
        assert_eq!(new.session_id, 3);
        assert_eq!(new.input_audio_ref.as_deref(), Some("uploads/a.wav"));
        assert!(new.input_text.is_none());
    }

    #[test]
    fn test_request_requires_session() {
        assert!(serde_json::from_str::<OrchestrateRequest>(r#"{"input_text": "hi"}"#).is_err());
    }
}

//! API response types

use lestockage::{Interaction, InteractionId};
use serde::{Deserialize, Serialize};

/// Message returned when a run has been handed off
pub const ORCHESTRATION_STARTED: &str = "Orchestration process started.";

/// Answer of the trigger endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrateResponse {
    /// Identifier of the new interaction
    pub interaction_id: InteractionId,

    /// Human-readable acknowledgement
    pub message: String,
}

impl OrchestrateResponse {
    /// Acknowledge a scheduled run
    pub fn started(interaction_id: InteractionId) -> Self {
        Self {
            interaction_id,
            message: ORCHESTRATION_STARTED.to_string(),
        }
    }
}

/// One interaction with its pipeline progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionResponse {
    /// Stored record
    #[serde(flatten)]
    pub interaction: Interaction,

    /// Whether the pipeline has finished with this interaction
    pub is_terminal: bool,
}

impl From<Interaction> for InteractionResponse {
    fn from(interaction: Interaction) -> Self {
        let is_terminal = interaction.status.is_terminal();
        Self {
            interaction,
            is_terminal,
        }
    }
}

/// Interactions of one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInteractionsResponse {
    /// Session identifier
    pub session_id: i64,

    /// Interactions, oldest first
    pub interactions: Vec<InteractionResponse>,

    /// Number of interactions
    pub count: usize,
}

impl SessionInteractionsResponse {
    /// Build from stored records
    pub fn new(session_id: i64, interactions: Vec<Interaction>) -> Self {
        let interactions: Vec<InteractionResponse> =
            interactions.into_iter().map(Into::into).collect();
        Self {
            session_id,
            count: interactions.len(),
            interactions,
        }
    }
}

/// Health check answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `ok` when the server answers
    pub status: String,

    /// Service name
    pub service: String,

    /// Crate version
    pub version: String,

    /// Pipeline runs in flight
    pub active_runs: usize,
}

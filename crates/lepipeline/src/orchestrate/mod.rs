//! Orchestration of one interaction through every pipeline stage.

/// Orchestration runtime configuration.
pub mod context;
/// Stage sequencing engine.
pub mod engine;
/// Run outcome and report.
pub mod state;

pub use context::PipelineContext;
pub use engine::Orchestrator;
pub use state::{RunOutcome, RunReport};

//! lepipeline - Interaction Pipeline
//!
//! *Le Pipeline* (The Pipeline) - Stage sequencing, job polling, and run scheduling for one conversational turn

#![warn(missing_docs)]
#![warn(unused_extern_crates)]

/// Pipeline error types.
pub mod error;
/// Orchestration of one interaction through every stage.
pub mod orchestrate;
/// Bounded polling of the asynchronous video job.
pub mod polling;
/// Fire-and-forget run scheduling.
pub mod scheduler;

/// Scripted collaborator doubles.
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use error::{PipelineError, Result};
pub use orchestrate::{Orchestrator, PipelineContext, RunOutcome, RunReport};
pub use polling::{PollOutcome, PollResult, PollingMonitor, PollingPolicy};
pub use scheduler::PipelineScheduler;

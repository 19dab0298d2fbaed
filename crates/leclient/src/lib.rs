//! leclient - Collaborator Clients
//!
//! *Le Client* (The Client) - Typed HTTP calls to the perception, content, memory, vocal, and embodiment services

#![warn(missing_docs)]
#![warn(unused_extern_crates)]

/// Collaborator endpoint configuration.
pub mod config;
/// Collaborator error types.
pub mod error;
/// HTTP implementation of the collaborator traits.
pub mod http;
/// One trait per collaborator.
pub mod traits;
/// Request and response payloads.
pub mod types;

pub use config::{CollaboratorEndpoint, CollaboratorKind, CollaboratorsConfig};
pub use error::{CollaboratorError, Result};
pub use http::HttpCollaborators;
pub use traits::{
    Collaborators, ContentCollaborator, EmbodimentCollaborator, MemoryCollaborator,
    PerceptionCollaborator, VocalCollaborator,
};
pub use types::{
    ContentOutput, EmbodimentJob, ExtractedMemory, FactScope, JobState, JobStatusReport,
    MemoryExtraction, Stage, StageRequest, VocalOutput,
};

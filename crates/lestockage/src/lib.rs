//! lestockage - Persistent Storage Layer
//!
//! *Le Stockage* (The Storage) - SQLite records for interactions, sessions, and memories

#![warn(missing_docs)]
#![warn(unused_extern_crates)]

/// Storage error types.
pub mod error;
/// Interaction records and the status lifecycle.
pub mod interactions;
/// User and avatar memory facts.
pub mod memories;
/// Database schema and connection management.
pub mod schema;
/// Users, avatars, and sessions.
pub mod sessions;

pub use error::{Result, StoreError};
pub use interactions::{
    Interaction, InteractionId, InteractionRepository, InteractionStatus, InteractionStore,
    NewInteraction,
};
pub use memories::{MemoryRecord, MemoryScope, MemoryStore, NewMemory};
pub use schema::{SharedStorage, Storage, StorageConfig};
pub use sessions::{AvatarRecord, SessionRecord, SessionStore, UserRecord};

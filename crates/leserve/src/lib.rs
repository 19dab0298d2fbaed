//! leserve - HTTP Server
//!
//! *Le Serve* (The Server) - Axum-based trigger endpoint for the LeAvatar interaction pipeline

#![warn(missing_docs)]
#![warn(unused_extern_crates)]

/// API error types
pub mod error;

/// HTTP handlers for REST endpoints
pub mod handlers;

/// Server configuration from TOML
pub mod config;

/// Log subscriber setup for the binary
pub mod logging;

/// API response types
pub mod responses;

/// Server instance management
pub mod server;

pub use config::{ConfigError, PollingConfig, ServerConfig};
pub use error::{ApiError, ApiResult};
pub use handlers::{create_router, AppState};
pub use logging::init_logging;
pub use server::LeServeServer;

//! Server instance management

use axum::Router;
use http::HeaderValue;
use leclient::{Collaborators, HttpCollaborators};
use lestockage::{SharedStorage, Storage};
use std::net::SocketAddr;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::handlers::{create_router, AppState};

/// LeServe HTTP server
///
/// Manages Axum server lifecycle including startup and graceful shutdown.
pub struct LeServeServer {
    /// Server configuration
    config: ServerConfig,

    /// Storage shared by handlers and pipeline runs
    storage: SharedStorage,

    /// Handler state
    state: AppState,
}

impl LeServeServer {
    /// Create a server talking to the configured HTTP collaborators
    ///
    /// # Returns
    ///
    /// `Result<LeServeServer, ApiError>` - Server or error
    pub fn new(config: ServerConfig) -> Result<Self, ApiError> {
        let collaborators = HttpCollaborators::new(config.collaborators.clone())
            .map_err(|e| ApiError::internal(format!("Invalid config: {}", e)))?;
        Self::with_collaborators(config, Collaborators::uniform(std::sync::Arc::new(collaborators)))
    }

    /// Create a server with explicit collaborators
    pub fn with_collaborators(
        config: ServerConfig,
        collaborators: Collaborators,
    ) -> Result<Self, ApiError> {
        if let Err(e) = config.validate() {
            return Err(ApiError::internal(format!("Invalid config: {}", e)));
        }

        let storage = Storage::open(&config.db_path)
            .map_err(|e| {
                error!("Failed to open storage: {}", e);
                ApiError::internal(format!("Failed to open storage: {}", e))
            })?
            .into_shared();

        let state = AppState::new(storage.clone(), collaborators, config.clone())?;
        report_stuck_interactions(&state);

        Ok(Self {
            config,
            storage,
            state,
        })
    }

    /// Get socket address for binding
    pub fn socket_addr(&self) -> Result<SocketAddr, ApiError> {
        self.config
            .socket_addr()
            .map_err(|e| ApiError::internal(format!("Failed to parse address: {}", e)))
    }

    /// Router with state and middleware applied
    pub fn router(&self) -> Result<Router, ApiError> {
        let mut app = create_router().with_state(self.state.clone());

        if !self.config.cors_origins.is_empty() {
            let origins = self
                .config
                .cors_origins
                .iter()
                .map(|o| {
                    o.parse::<HeaderValue>()
                        .map_err(|e| ApiError::internal(format!("Invalid CORS origin {}: {}", o, e)))
                })
                .collect::<Result<Vec<_>, _>>()?;
            app = app.layer(CorsLayer::new().allow_origin(origins));
        }

        if self.config.enable_logging {
            app = app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));
        }

        Ok(app)
    }

    /// Start server and run until a shutdown signal arrives
    pub async fn start(&self) -> Result<(), ApiError> {
        let addr = self.socket_addr()?;
        let app = self.router()?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| {
                error!("Failed to bind to {}: {:?}", addr, e);
                ApiError::internal(format!("Failed to bind to {}: {}", addr, e))
            })?;

        info!("Server listening on: {}", self.server_url());

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ApiError::internal(format!("Server error: {}", e)))?;

        self.checkpoint();
        Ok(())
    }

    /// Get storage reference
    #[must_use]
    pub fn storage(&self) -> SharedStorage {
        self.storage.clone()
    }

    /// Handler state, including the run scheduler
    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Get server URL
    #[must_use]
    pub fn server_url(&self) -> String {
        self.config.server_url()
    }

    fn checkpoint(&self) {
        match self.storage.lock() {
            Ok(mut storage) => {
                if let Err(e) = storage.close() {
                    warn!("Failed to checkpoint storage: {}", e);
                }
            }
            Err(_) => warn!("Storage lock poisoned, skipping checkpoint"),
        }
    }
}

/// Interactions left in `processing` by an earlier process are not resumed
fn report_stuck_interactions(state: &AppState) {
    match state.interactions.list_processing() {
        Ok(stuck) if !stuck.is_empty() => {
            warn!(
                count = stuck.len(),
                "Interactions left in processing by a previous run"
            );
        }
        Ok(_) => {}
        Err(e) => warn!("Failed to scan for stuck interactions: {}", e),
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix;
        match unix::signal(unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
                info!("Received TERM signal");
            }
            Err(e) => {
                error!("Failed to install TERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn test_config(file: &NamedTempFile) -> ServerConfig {
        ServerConfig {
            db_path: file.path().to_string_lossy().into_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn test_server_default_config() {
        let file = NamedTempFile::new().unwrap();
        let server = LeServeServer::new(test_config(&file)).unwrap();
        assert_eq!(server.server_url(), "http://127.0.0.1:8000");
        assert!(server.router().is_ok());
    }

    #[test]
    fn test_server_rejects_invalid_config() {
        let file = NamedTempFile::new().unwrap();
        let mut config = test_config(&file);
        config.polling.interval_secs = 0;
        assert!(LeServeServer::new(config).is_err());
    }

    #[test]
    fn test_server_rejects_bad_cors_origin() {
        let file = NamedTempFile::new().unwrap();
        let mut config = test_config(&file);
        config.cors_origins = vec!["bad\norigin".to_string()];
        let server = LeServeServer::new(config).unwrap();
        assert!(server.router().is_err());
    }
}

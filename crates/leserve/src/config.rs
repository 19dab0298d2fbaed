//! Server configuration from TOML or environment

use leclient::CollaboratorsConfig;
use lepipeline::polling::{DEFAULT_POLL_INTERVAL_SECS, DEFAULT_POLL_TIMEOUT_SECS};
use lepipeline::{PipelineError, PollingPolicy};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default host address
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default port number
pub const DEFAULT_PORT: u16 = 8000;

/// Default database path
pub const DEFAULT_DB_PATH: &str = "leavatar.db";

/// Errors reading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("Failed to read config file {path:?}: {source}")]
    Io {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for this schema
    #[error("Failed to parse config file {path:?}: {source}")]
    Parse {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: toml::de::Error,
    },
}

/// Interval and budget for watching the video job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Seconds between status queries
    pub interval_secs: u64,

    /// Wall-clock budget in seconds
    pub timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
        }
    }
}

impl PollingConfig {
    /// Build the polling policy
    pub fn policy(&self) -> Result<PollingPolicy, PipelineError> {
        PollingPolicy::from_secs(self.interval_secs, self.timeout_secs)
    }
}

/// Server configuration loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address
    pub host: String,

    /// Server port
    pub port: u16,

    /// Allowed CORS origins; empty disables CORS headers
    pub cors_origins: Vec<String>,

    /// Path to SQLite database
    pub db_path: String,

    /// Enable request logging
    pub enable_logging: bool,

    /// Log level for tracing
    pub log_level: String,

    /// Collaborator endpoints
    pub collaborators: CollaboratorsConfig,

    /// Video job polling
    pub polling: PollingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            cors_origins: Vec::new(),
            db_path: DEFAULT_DB_PATH.to_string(),
            enable_logging: true,
            log_level: "info".to_string(),
            collaborators: CollaboratorsConfig::default(),
            polling: PollingConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load config from a TOML file; missing keys keep their defaults
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load config from environment variables with fallback to defaults
    ///
    /// Environment variables:
    /// - `LESERVE_HOST` - Server host
    /// - `LESERVE_PORT` - Server port
    /// - `LESERVE_DB_PATH` - Database path
    /// - `LESERVE_LOG_LEVEL` - Log level (trace, debug, info, warn, error)
    /// - `PERCEPTION_SERVICE_URL`, `CONVERSATIONAL_SERVICE_URL`,
    ///   `MEMORY_SERVICE_URL`, `VOCAL_SERVICE_URL`, `EMBODIMENT_SERVICE_URL`
    /// - `POLLING_INTERVAL_SECS`, `POLLING_TIMEOUT_SECS`
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply environment overrides on top of this config
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    /// Apply overrides using `lookup` for environment values
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("LESERVE_HOST") {
            self.host = host;
        }

        if let Some(port) = lookup("LESERVE_PORT").and_then(|p| p.parse::<u16>().ok()) {
            self.port = port;
        }

        if let Some(db_path) = lookup("LESERVE_DB_PATH") {
            self.db_path = db_path;
        }

        if let Some(log_level) = lookup("LESERVE_LOG_LEVEL") {
            self.log_level = log_level;
        }

        if let Some(secs) = lookup("POLLING_INTERVAL_SECS").and_then(|s| s.parse::<u64>().ok()) {
            self.polling.interval_secs = secs;
        }

        if let Some(secs) = lookup("POLLING_TIMEOUT_SECS").and_then(|s| s.parse::<u64>().ok()) {
            self.polling.timeout_secs = secs;
        }

        self.collaborators.apply_env_with(&lookup);
    }

    /// Get the socket address for the server
    ///
    /// # Returns
    ///
    /// `Result<SocketAddr, String>` - Parsed address or error message
    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| format!("Invalid address: {}", e))
    }

    /// Get the full server URL
    #[must_use]
    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Validate configuration
    ///
    /// # Returns
    ///
    /// `Result<(), String>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port cannot be zero".to_string());
        }

        if self.host.is_empty() {
            return Err("Host cannot be empty".to_string());
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.log_level
                ));
            }
        }

        if self.polling.interval_secs == 0 {
            return Err("Polling interval must be greater than zero".to_string());
        }

        if self.polling.timeout_secs < self.polling.interval_secs {
            return Err(format!(
                "Polling timeout ({}s) must be at least one interval ({}s)",
                self.polling.timeout_secs, self.polling.interval_secs
            ));
        }

        self.collaborators.validate().map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.db_path, DEFAULT_DB_PATH);
        assert!(config.enable_logging);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.polling.interval_secs, 10);
        assert_eq!(config.polling.timeout_secs, 3600);
        assert_eq!(config.polling.policy().unwrap().max_attempts(), 360);
    }

    #[test]
    fn test_config_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("LESERVE_HOST", "0.0.0.0"),
            ("LESERVE_PORT", "8080"),
            ("LESERVE_DB_PATH", "/tmp/test.db"),
            ("LESERVE_LOG_LEVEL", "debug"),
            ("POLLING_INTERVAL_SECS", "5"),
            ("POLLING_TIMEOUT_SECS", "60"),
            ("EMBODIMENT_SERVICE_URL", "http://localhost:8004/v1"),
        ]
        .into_iter()
        .collect();

        let mut config = ServerConfig::default();
        config.apply_env_with(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.db_path, "/tmp/test.db");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.polling.interval_secs, 5);
        assert_eq!(config.polling.timeout_secs, 60);
        assert_eq!(config.collaborators.embodiment.base_url, "http://localhost:8004/v1");
    }

    #[test]
    fn test_unparseable_port_is_ignored() {
        let mut config = ServerConfig::default();
        config.apply_env_with(|name| (name == "LESERVE_PORT").then(|| "http".to_string()));
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_load_partial_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
port = 9100

[polling]
interval_secs = 2

[collaborators.vocal]
base_url = "http://tts.internal:7000/v1"
timeout_secs = 45
"#
        )
        .unwrap();

        let config = ServerConfig::load(file.path()).unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.polling.interval_secs, 2);
        assert_eq!(config.polling.timeout_secs, 3600);
        assert_eq!(config.collaborators.vocal.timeout_secs, 45);
        assert_eq!(config.collaborators.content.timeout_secs, 120);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            ServerConfig::load("/nonexistent/leserve.toml"),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_load_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "port = \"not a number\"").unwrap();
        assert!(matches!(
            ServerConfig::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_config_socket_addr() {
        let config = ServerConfig::default();
        let addr = config.socket_addr().expect("Default socket address should be valid");
        assert_eq!(addr.ip(), std::net::Ipv4Addr::new(127, 0, 0, 1));
        assert_eq!(addr.port(), DEFAULT_PORT);
        assert_eq!(config.server_url(), "http://127.0.0.1:8000");
    }

    #[test]
    fn test_config_validate_success() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_validate_zero_poll_interval() {
        let config = ServerConfig {
            polling: PollingConfig {
                interval_secs: 0,
                timeout_secs: 60,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validate_timeout_below_interval() {
        let config = ServerConfig {
            polling: PollingConfig {
                interval_secs: 30,
                timeout_secs: 10,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validate_invalid_log_level() {
        let config = ServerConfig {
            log_level: "invalid".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validate_bad_collaborator_url() {
        let mut config = ServerConfig::default();
        config.collaborators.perception.base_url = "perception:8000".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.contains("perception"));
    }
}

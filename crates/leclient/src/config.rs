//! Collaborator endpoints from TOML or environment

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{CollaboratorError, Result};

/// Default timeout for job status queries in seconds
pub const DEFAULT_STATUS_TIMEOUT_SECS: u64 = 30;

/// Downstream service a stage talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaboratorKind {
    /// Perception service
    Perception,
    /// Conversational (content + expression) service
    Content,
    /// Memory extraction service
    Memory,
    /// Text-to-speech service
    Vocal,
    /// Video rendering service
    Embodiment,
}

impl CollaboratorKind {
    /// Every collaborator, in pipeline order
    pub const ALL: [CollaboratorKind; 5] = [
        CollaboratorKind::Perception,
        CollaboratorKind::Content,
        CollaboratorKind::Memory,
        CollaboratorKind::Vocal,
        CollaboratorKind::Embodiment,
    ];

    /// Stable name used in logs and config keys
    pub fn as_str(&self) -> &'static str {
        match self {
            CollaboratorKind::Perception => "perception",
            CollaboratorKind::Content => "content",
            CollaboratorKind::Memory => "memory",
            CollaboratorKind::Vocal => "vocal",
            CollaboratorKind::Embodiment => "embodiment",
        }
    }

    /// Environment variable overriding the base URL
    pub fn env_var(&self) -> &'static str {
        match self {
            CollaboratorKind::Perception => "PERCEPTION_SERVICE_URL",
            CollaboratorKind::Content => "CONVERSATIONAL_SERVICE_URL",
            CollaboratorKind::Memory => "MEMORY_SERVICE_URL",
            CollaboratorKind::Vocal => "VOCAL_SERVICE_URL",
            CollaboratorKind::Embodiment => "EMBODIMENT_SERVICE_URL",
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            CollaboratorKind::Perception => "http://perception-service:8000/v1",
            CollaboratorKind::Content => "http://conversational-service:8000/v1",
            CollaboratorKind::Memory => "http://memory-service:8000/v1",
            CollaboratorKind::Vocal => "http://vocal-service:8000/v1",
            CollaboratorKind::Embodiment => "http://embodiment-service:8004/v1",
        }
    }

    fn default_timeout_secs(&self) -> u64 {
        match self {
            CollaboratorKind::Perception => 300,
            CollaboratorKind::Memory => 60,
            CollaboratorKind::Content | CollaboratorKind::Vocal | CollaboratorKind::Embodiment => {
                120
            }
        }
    }
}

impl fmt::Display for CollaboratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a collaborator lives and how long a call may take
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollaboratorEndpoint {
    /// Base URL, including any version prefix
    pub base_url: String,

    /// Per-call timeout in seconds
    pub timeout_secs: u64,
}

impl CollaboratorEndpoint {
    /// Create an endpoint
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs,
        }
    }

    /// Default endpoint for a collaborator
    pub fn default_for(kind: CollaboratorKind) -> Self {
        Self::new(kind.default_base_url(), kind.default_timeout_secs())
    }

    /// Per-call timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Join a path onto the base URL
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn validate(&self, kind: CollaboratorKind) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(CollaboratorError::Misconfiguration(format!(
                "{} base URL must start with http:// or https://, got '{}'",
                kind, self.base_url
            )));
        }
        if self.timeout_secs == 0 {
            return Err(CollaboratorError::Misconfiguration(format!(
                "{} timeout must be greater than zero",
                kind
            )));
        }
        Ok(())
    }
}

/// Endpoints of all five collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaboratorsConfig {
    /// Perception service
    pub perception: CollaboratorEndpoint,
    /// Conversational service
    pub content: CollaboratorEndpoint,
    /// Memory extraction service
    pub memory: CollaboratorEndpoint,
    /// Text-to-speech service
    pub vocal: CollaboratorEndpoint,
    /// Video rendering service
    pub embodiment: CollaboratorEndpoint,
    /// Timeout of a single job status query, in seconds
    pub status_timeout_secs: u64,
}

impl Default for CollaboratorsConfig {
    fn default() -> Self {
        Self {
            perception: CollaboratorEndpoint::default_for(CollaboratorKind::Perception),
            content: CollaboratorEndpoint::default_for(CollaboratorKind::Content),
            memory: CollaboratorEndpoint::default_for(CollaboratorKind::Memory),
            vocal: CollaboratorEndpoint::default_for(CollaboratorKind::Vocal),
            embodiment: CollaboratorEndpoint::default_for(CollaboratorKind::Embodiment),
            status_timeout_secs: DEFAULT_STATUS_TIMEOUT_SECS,
        }
    }
}

impl CollaboratorsConfig {
    /// Endpoint of one collaborator
    pub fn endpoint(&self, kind: CollaboratorKind) -> &CollaboratorEndpoint {
        match kind {
            CollaboratorKind::Perception => &self.perception,
            CollaboratorKind::Content => &self.content,
            CollaboratorKind::Memory => &self.memory,
            CollaboratorKind::Vocal => &self.vocal,
            CollaboratorKind::Embodiment => &self.embodiment,
        }
    }

    /// Mutable endpoint of one collaborator
    pub fn endpoint_mut(&mut self, kind: CollaboratorKind) -> &mut CollaboratorEndpoint {
        match kind {
            CollaboratorKind::Perception => &mut self.perception,
            CollaboratorKind::Content => &mut self.content,
            CollaboratorKind::Memory => &mut self.memory,
            CollaboratorKind::Vocal => &mut self.vocal,
            CollaboratorKind::Embodiment => &mut self.embodiment,
        }
    }

    /// Timeout of a single job status query
    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.status_timeout_secs)
    }

    /// Load endpoints from environment variables with fallback to defaults
    ///
    /// Environment variables:
    /// - `PERCEPTION_SERVICE_URL`
    /// - `CONVERSATIONAL_SERVICE_URL`
    /// - `MEMORY_SERVICE_URL`
    /// - `VOCAL_SERVICE_URL`
    /// - `EMBODIMENT_SERVICE_URL`
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_with(|name| std::env::var(name).ok());
        config
    }

    /// Override base URLs using `lookup` for environment values
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for kind in CollaboratorKind::ALL {
            if let Some(url) = lookup(kind.env_var()).filter(|u| !u.trim().is_empty()) {
                self.endpoint_mut(kind).base_url = url;
            }
        }
    }

    /// Validate every endpoint
    pub fn validate(&self) -> Result<()> {
        for kind in CollaboratorKind::ALL {
            self.endpoint(kind).validate(kind)?;
        }
        if self.status_timeout_secs == 0 {
            return Err(CollaboratorError::Misconfiguration(
                "Status timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

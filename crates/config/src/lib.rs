//! Configuration loading and validation for AgentGate.
//!
//! Loads configuration from `agentgate.toml` with environment variable
//! overrides. The loaded [`AppConfig`] is constructed once at startup and
//! injected into whoever needs it — there is no global settings cache.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `agentgate.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Agent definition served on the bare `/invoke` surface
    #[serde(default = "default_active_agent")]
    pub active_agent: String,

    /// Completion backend: "stub", "openai", or "openrouter"
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Directory of preset agent definition files seeded at startup
    #[serde(default = "default_presets_dir")]
    pub presets_dir: PathBuf,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Authorization configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Backend-specific configurations keyed by backend name
    #[serde(default)]
    pub backends: HashMap<String, BackendConfig>,
}

fn default_active_agent() -> String {
    "summarizer".into()
}
fn default_backend() -> String {
    "stub".into()
}
fn default_presets_dir() -> PathBuf {
    PathBuf::from("./presets")
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Comma-separated allowed origins, or "*"
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    4280
}
fn default_cors_origins() -> String {
    "*".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

/// Storage settings. Registry and sessions share one SQLite database file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "./data/agentgate.db".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Authorization settings.
///
/// No token configured → auth disabled. `token` is a single shared secret
/// (anonymous principal); `tokens` maps bearer tokens to named subjects,
/// which enables registry ownership checks.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// token → subject
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tokens: HashMap<String, String>,
}

impl AuthConfig {
    pub fn enabled(&self) -> bool {
        self.token.is_some() || !self.tokens.is_empty()
    }
}

/// Settings for one completion backend.
#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: None,
            model: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("active_agent", &self.active_agent)
            .field("backend", &self.backend)
            .field("presets_dir", &self.presets_dir)
            .field("server", &self.server)
            .field("storage", &self.storage)
            .field("auth", &self.auth)
            .field("backends", &self.backends)
            .finish()
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &redact(&self.token))
            .field("tokens", &format_args!("{} mapped", self.tokens.len()))
            .finish()
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path with environment overrides.
    ///
    /// The path comes from `AGENTGATE_CONFIG`, falling back to
    /// `./agentgate.toml`. A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("AGENTGATE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./agentgate.toml"));
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path (no env overrides).
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(config)
    }

    /// Environment variable overrides (highest priority).
    pub fn apply_env_overrides(&mut self) {
        if let Ok(agent) = std::env::var("AGENTGATE_AGENT") {
            self.active_agent = agent;
        }
        if let Ok(backend) = std::env::var("AGENTGATE_BACKEND") {
            self.backend = backend.to_lowercase();
        }
        if let Ok(token) = std::env::var("AUTH_TOKEN") {
            if !token.is_empty() {
                self.auth.token = Some(token);
            }
        }
        if let Ok(db_path) = std::env::var("AGENTGATE_DB_PATH") {
            self.storage.db_path = db_path;
        }
        if let Ok(port) = std::env::var("AGENTGATE_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            self.server.cors_origins = origins;
        }
        if let Ok(dir) = std::env::var("AGENTGATE_PRESETS_DIR") {
            self.presets_dir = PathBuf::from(dir);
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.active_agent.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "active_agent must not be empty".into(),
            ));
        }
        if self.server.cors_origins.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "server.cors_origins must not be empty (use \"*\" to allow all)".into(),
            ));
        }
        Ok(())
    }

    /// Settings for the configured backend, if any were given.
    pub fn backend_config(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.get(name)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            active_agent: default_active_agent(),
            backend: default_backend(),
            presets_dir: default_presets_dir(),
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            auth: AuthConfig::default(),
            backends: HashMap::new(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::collab::EvictionPolicy;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port, shared by the API and the collaboration upgrade
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins, comma separated
    pub cors_origins: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Path prefix of the WebSocket upgrade; the room id follows it
    #[serde(default = "default_collab_path")]
    pub collab_path: String,

    /// HS256 secret for bearer tokens; the channel is open when unset
    pub auth_jwt_secret: Option<String>,

    /// What to do with a room once its last editor leaves
    #[serde(default)]
    pub room_eviction: EvictionPolicy,

    /// Seconds between keepalive pings, 0 disables them
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            dotenvy::dotenv().ok();
        }

        let config = envy::from_env::<Config>().map_err(|e| {
            error!("Failed to load configuration: {}", e);
            ConfigError::Env(e)
        })?;
        config.validate()?;
        info!("Configuration loaded successfully");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let path = &self.collab_path;
        if !path.starts_with('/') || path.len() < 2 || path.ends_with('/') {
            return Err(ConfigError::CollabPath(path.clone()));
        }
        Ok(())
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval_secs > 0).then(|| Duration::from_secs(self.ping_interval_secs))
    }

    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .as_deref()
            .unwrap_or(DEFAULT_CORS_ORIGIN)
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            cors_origins: None,
            collab_path: default_collab_path(),
            auth_jwt_secret: None,
            room_eviction: EvictionPolicy::default(),
            ping_interval_secs: default_ping_interval_secs(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    Env(#[from] envy::Error),
    #[error("COLLAB_PATH must start with '/' and not end with '/', got '{0}'")]
    CollabPath(String),
}

/// Dev server origin of the browser client.
const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_collab_path() -> String {
    "/collaboration".to_string()
}

fn default_ping_interval_secs() -> u64 {
    30
}

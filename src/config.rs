// Client configuration
//
// Gateway endpoint and local session-store settings. Loaded from a TOML
// file through the `config` crate, or from the environment for quick
// setups; a decoded session token's api_endpoint overrides host and port.

use config::{Config, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use crate::error::{DatastoreError, Result};

/// Default gateway port
pub const DEFAULT_PORT: u16 = 6270;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Gateway host
    pub host: String,

    /// Gateway port
    pub port: u16,

    /// `http` or `https`
    pub scheme: String,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Path of the durable session blob; `None` keeps the session in memory
    pub session_store_path: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            scheme: "http".to_string(),
            timeout_seconds: 30,
            session_store_path: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .map_err(|e| DatastoreError::config(format!("Failed to load config: {e}")))?;

        config
            .try_deserialize::<ClientConfig>()
            .map_err(|e| DatastoreError::config(format!("Invalid config: {e}")))
    }

    /// Build configuration from the environment, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env::var("DATASTORE_API_HOST").unwrap_or(defaults.host),
            port: env::var("DATASTORE_API_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            scheme: env::var("DATASTORE_API_SCHEME").unwrap_or(defaults.scheme),
            timeout_seconds: env::var("DATASTORE_API_TIMEOUT")
                .ok()
                .and_then(|t| t.parse().ok())
                .unwrap_or(defaults.timeout_seconds),
            session_store_path: env::var("DATASTORE_SESSION_PATH").ok(),
        }
    }

    /// Gateway base endpoint, e.g. `http://localhost:6270`
    pub fn endpoint(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    /// Apply an `api_endpoint` advertised by a session token
    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self> {
        // A bare `host:port` parses as a scheme; retry with one prepended
        let url = match url::Url::parse(endpoint) {
            Ok(url) if url.host_str().is_some() => url,
            _ => url::Url::parse(&format!("http://{endpoint}"))
                .map_err(|e| DatastoreError::config(format!("Invalid api_endpoint: {e}")))?,
        };
        self.scheme = url.scheme().to_string();
        self.host = url
            .host_str()
            .ok_or_else(|| DatastoreError::config("api_endpoint has no host".to_string()))?
            .to_string();
        self.port = url.port_or_known_default().unwrap_or(DEFAULT_PORT);
        Ok(self)
    }
}

//! Configuration types for the stub server.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub signing: SigningConfig,

    /// Mounted base paths. Every listed route gets the full stub surface
    /// (set/delete/history/state/stub-list/dispatch) under `/{route}/...`.
    #[serde(default)]
    pub routes: Vec<String>,

    /// Optional callback-relay endpoint (fire-and-forget webhook delivery).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<CallbackConfig>,

    /// Optional JSON file of stub definitions written to storage at startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Backend type: "redis" or "inmemory"
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Redis connection URL
    #[serde(default = "default_storage_url")]
    pub url: String,
    /// Connection pool size
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_backend() -> String {
    "redis".to_string()
}

fn default_storage_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_pool_size() -> usize {
    10
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: default_storage_url(),
            pool_size: default_pool_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SigningConfig {
    /// Signing secret for response signatures. Falls back to the
    /// SIGNING_SECRET environment variable, then to a development default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl SigningConfig {
    pub fn resolve_secret(&self) -> String {
        if let Some(ref secret) = self.secret {
            return secret.clone();
        }
        std::env::var("SIGNING_SECRET").unwrap_or_else(|_| "secretKey".to_string())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CallbackConfig {
    /// Base path segment the callback endpoint is mounted under.
    pub route: String,
    /// TTL for pending callback registrations.
    #[serde(default = "default_callback_ttl")]
    pub ttl_seconds: i64,
}

fn default_callback_ttl() -> i64 {
    7 * 24 * 3600
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.routes.is_empty() {
            anyhow::bail!("At least one route must be configured under 'routes'");
        }

        for route in &self.routes {
            if route.is_empty() || route.contains('/') {
                anyhow::bail!(
                    "Invalid route '{route}': routes are single path segments without slashes"
                );
            }
        }

        let mut seen = std::collections::HashSet::new();
        for route in &self.routes {
            if !seen.insert(route) {
                anyhow::bail!("Duplicate route '{route}'");
            }
        }

        match self.storage.backend.as_str() {
            "redis" | "inmemory" => {}
            other => anyhow::bail!(
                "Unsupported storage backend: '{other}'. Supported: redis, inmemory"
            ),
        }

        if let Some(ref callback) = self.callback {
            if callback.route.is_empty() || callback.route.contains('/') {
                anyhow::bail!("Invalid callback route '{}'", callback.route);
            }
            if self.routes.contains(&callback.route) {
                anyhow::bail!(
                    "Callback route '{}' collides with a mounted stub route",
                    callback.route
                );
            }
        }

        Ok(())
    }
}

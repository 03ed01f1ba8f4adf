//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Admission control configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Counter store configuration
    #[serde(default)]
    pub store: StoreConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().unwrap()
}

/// Admission control configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Maximum requests per IP in the trailing one-second window
    #[serde(default = "default_max_requests_per_ip")]
    pub max_requests_per_ip: u32,

    /// How long an identity stays blocked after breaching its quota, in seconds
    #[serde(default = "default_block_seconds")]
    pub block_seconds: u64,

    /// Deadline for each counter store call, in milliseconds
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_requests_per_ip: default_max_requests_per_ip(),
            block_seconds: default_block_seconds(),
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

fn default_max_requests_per_ip() -> u32 {
    10
}

fn default_block_seconds() -> u64 {
    60
}

fn default_store_timeout_ms() -> u64 {
    1000
}

/// Counter store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Which store implementation to wire in
    #[serde(default)]
    pub backend: StoreBackend,

    /// Redis connection URL, used when `backend` is `redis`
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: default_redis_url(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

/// Selects the counter store implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process store; state is lost on restart
    #[default]
    Memory,
    /// Redis-backed store for multi-instance deployments
    Redis,
}

impl TurnstileConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: TurnstileConfig = serde_yaml::from_str(&contents)
            .map_err(|e| crate::error::TurnstileError::Config(e.to_string()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TurnstileConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert_eq!(config.limiter.max_requests_per_ip, 10);
        assert_eq!(config.limiter.block_seconds, 60);
        assert_eq!(config.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
limiter:
  max_requests_per_ip: 3
  block_seconds: 120
store:
  backend: redis
  redis_url: redis://cache.internal:6379
"#;
        let config: TurnstileConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.limiter.max_requests_per_ip, 3);
        assert_eq!(config.limiter.block_seconds, 120);
        // untouched sections fall back to defaults
        assert_eq!(config.limiter.store_timeout_ms, 1000);
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.redis_url, "redis://cache.internal:6379");
        assert_eq!(config.server.listen_addr.port(), 8080);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let yaml = "store:\n  backend: etcd\n";
        assert!(serde_yaml::from_str::<TurnstileConfig>(yaml).is_err());
    }
}

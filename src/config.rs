// src/config.rs
//! Configuration file parsing for Canister
//!
//! Supports TOML configuration files with the following sections:
//! - [server] - Bind address and control channel token
//! - [storage] - Database path and artifact cache directory
//! - [refresh] - Manifest location, worker count, timeouts
//! - [headers] - Device headers sent to repositories
//!
//! Every section is optional. `CANISTER_TOKEN`, `CANISTER_DATABASE` and
//! `CANISTER_MANIFEST_URL` override the file.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// TOML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub refresh: RefreshSection,

    #[serde(default)]
    pub headers: HeadersConfig,
}

/// Server configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    /// Control plane bind address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Bearer token required on the WebSocket channel
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            token: None,
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

/// Storage configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Root of the artifact cache
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            database: default_database(),
            cache_dir: default_cache_dir(),
        }
    }
}

fn default_database() -> PathBuf {
    PathBuf::from("/var/lib/canister/canister.db")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("/tmp/canister")
}

/// Refresh cycle configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshSection {
    /// JSON document listing the repositories to ingest
    #[serde(default)]
    pub manifest_url: Option<String>,

    /// Repositories processed at once
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Architecture used in the distribution layout
    #[serde(default = "default_architecture")]
    pub architecture: String,
}

impl Default for RefreshSection {
    fn default() -> Self {
        Self {
            manifest_url: None,
            workers: default_workers(),
            timeout_secs: default_timeout_secs(),
            architecture: default_architecture(),
        }
    }
}

impl RefreshSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_workers() -> usize {
    8
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_architecture() -> String {
    "iphoneos-arm".to_string()
}

/// Device headers sent with every repository request
///
/// Jailbreak repositories vary their answers on these, so they mimic a
/// package manager running on a device.
#[derive(Debug, Clone, Deserialize)]
pub struct HeadersConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_machine")]
    pub machine: String,

    #[serde(default = "default_firmware")]
    pub firmware: String,

    #[serde(default = "default_unique_id")]
    pub unique_id: String,
}

impl Default for HeadersConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            machine: default_machine(),
            firmware: default_firmware(),
            unique_id: default_unique_id(),
        }
    }
}

fn default_user_agent() -> String {
    format!("Canister/{}", env!("CARGO_PKG_VERSION"))
}

fn default_machine() -> String {
    "iPhone10,3".to_string()
}

fn default_firmware() -> String {
    "14.5".to_string()
}

fn default_unique_id() -> String {
    "0000000000000000000000000000000000000000".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        Self::parse(&content)
            .map_err(|e| Error::ConfigError(format!("{}: {}", path.display(), e)))
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`, keyed by environment variable name
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup("CANISTER_TOKEN") {
            self.server.token = Some(token);
        }
        if let Some(database) = lookup("CANISTER_DATABASE") {
            self.storage.database = PathBuf::from(database);
        }
        if let Some(url) = lookup("CANISTER_MANIFEST_URL") {
            self.refresh.manifest_url = Some(url);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;

        if self.refresh.workers == 0 {
            return Err(Error::ConfigError(
                "refresh.workers must be at least 1".to_string(),
            ));
        }
        if self.refresh.timeout_secs == 0 {
            return Err(Error::ConfigError(
                "refresh.timeout_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server.bind.parse().map_err(|e| {
            Error::ConfigError(format!("Invalid server.bind address {}: {}", self.server.bind, e))
        })
    }

    /// Manifest URL, required for a refresh
    pub fn manifest_url(&self) -> Result<&str> {
        self.refresh.manifest_url.as_deref().ok_or_else(|| {
            Error::ConfigError(
                "No manifest URL configured (refresh.manifest_url or CANISTER_MANIFEST_URL)"
                    .to_string(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.storage.cache_dir, PathBuf::from("/tmp/canister"));
        assert_eq!(config.refresh.workers, 8);
        assert_eq!(config.refresh.timeout(), Duration::from_secs(30));
        assert_eq!(config.refresh.architecture, "iphoneos-arm");
        assert!(config.validate().is_ok());
        assert!(config.manifest_url().is_err());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            [server]
            bind = "127.0.0.1:9000"
            token = "secret"

            [refresh]
            manifest_url = "https://manifest.example.com/repositories.json"
            workers = 4

            [headers]
            firmware = "15.0"
        "#;

        let config = Config::parse(toml_str).unwrap();
        assert_eq!(config.server.token.as_deref(), Some("secret"));
        assert_eq!(config.refresh.workers, 4);
        assert_eq!(config.refresh.timeout_secs, 30);
        assert_eq!(config.headers.firmware, "15.0");
        assert_eq!(config.headers.machine, "iPhone10,3");
        assert_eq!(
            config.manifest_url().unwrap(),
            "https://manifest.example.com/repositories.json"
        );
    }

    #[test]
    fn test_invalid_values() {
        assert!(Config::parse("[server]\nbind = \"not an address\"\n").is_err());
        assert!(Config::parse("[refresh]\nworkers = 0\n").is_err());
        assert!(Config::parse("[refresh]\nworkers = \"eight\"\n").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            "CANISTER_TOKEN" => Some("from-env".to_string()),
            "CANISTER_DATABASE" => Some("/srv/canister.db".to_string()),
            _ => None,
        });

        assert_eq!(config.server.token.as_deref(), Some("from-env"));
        assert_eq!(config.storage.database, PathBuf::from("/srv/canister.db"));
        assert_eq!(config.refresh.manifest_url, None);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/canister.toml"));
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }
}

//! Daemon Configuration
//!
//! Configuration management for the Inform Online daemon.

use anyhow::{Context, Result};
use inform_online_protocol::ping::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
use inform_online_protocol::supervisor::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_RETRY_INTERVAL};
use inform_online_protocol::{FieldPolicy, SupervisorConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file inside the config directory
const CONFIG_FILE: &str = "daemon.toml";

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Inform Online service configuration
    pub server: ServerConfig,

    /// Connection supervisor configuration
    #[serde(default)]
    pub supervisor: SupervisorSection,

    /// Device cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Storage paths
    pub paths: PathConfig,
}

/// Inform Online service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL the ping, checkin and device list endpoints hang off
    #[serde(default = "default_server_url")]
    pub url: String,

    /// Service host (reported in logs)
    #[serde(default = "default_host")]
    pub host: String,

    /// Service port (reported in logs)
    #[serde(default = "default_port")]
    pub port: u16,

    /// TCP connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Whole-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Connection supervisor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorSection {
    /// Seconds to wait between probes
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,
}

/// Device cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Require the owner-only fields (lastCheckin, pin, status, transfer)
    #[serde(default = "default_true")]
    pub require_owner_fields: bool,
}

/// Storage paths configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    /// Configuration directory
    pub config_dir: PathBuf,

    /// Data directory (device cache, registration)
    pub data_dir: PathBuf,
}

fn default_server_url() -> String {
    format!("http://{}:{}", DEFAULT_HOST, DEFAULT_PORT)
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_secs()
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_retry_interval() -> u64 {
    DEFAULT_RETRY_INTERVAL.as_secs()
}

fn default_true() -> bool {
    true
}

fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join("inform-online")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            host: default_host(),
            port: default_port(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            retry_interval_secs: default_retry_interval(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            require_owner_fields: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join("inform-online");

        Self {
            server: ServerConfig::default(),
            supervisor: SupervisorSection::default(),
            cache: CacheConfig::default(),
            paths: PathConfig {
                config_dir: default_config_dir(),
                data_dir,
            },
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if not found
    ///
    /// Without an explicit path the file is `daemon.toml` in the user's
    /// config directory.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_config_dir().join(CONFIG_FILE));

        if config_path.exists() {
            let contents =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            let config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.paths.config_dir)
            .context("Failed to create config directory")?;
        fs::create_dir_all(&self.paths.data_dir).context("Failed to create data directory")?;
        Ok(())
    }

    /// Path of the device cache file
    pub fn device_cache_path(&self) -> PathBuf {
        self.paths.data_dir.join("devices.json")
    }

    /// Path of the stored registration
    pub fn registration_path(&self) -> PathBuf {
        self.paths.data_dir.join("registration.json")
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.server.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Field policy for the device cache loader
    pub fn field_policy(&self) -> FieldPolicy {
        if self.cache.require_owner_fields {
            FieldPolicy::Strict
        } else {
            FieldPolicy::Lenient
        }
    }

    /// Library-level supervisor configuration
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            retry_interval: Duration::from_secs(self.supervisor.retry_interval_secs),
            host: self.server.host.clone(),
            port: self.server.port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.url, "http://localhost:5100");
        assert_eq!(config.server.port, 5100);
        assert_eq!(config.supervisor.retry_interval_secs, 600);
        assert!(config.cache.require_owner_fields);
        assert_eq!(config.field_policy(), FieldPolicy::Strict);
        assert_eq!(config.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.request_timeout(), DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.server.url, config.server.url);
        assert_eq!(parsed.paths.data_dir, config.paths.data_dir);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml_str = r#"
            [server]
            url = "https://inform.example.org"

            [cache]
            require_owner_fields = false

            [paths]
            config_dir = "/tmp/inform/config"
            data_dir = "/tmp/inform/data"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();

        assert_eq!(config.server.url, "https://inform.example.org");
        assert_eq!(config.server.request_timeout_secs, 30);
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.supervisor.retry_interval_secs, 600);
        assert_eq!(config.field_policy(), FieldPolicy::Lenient);
        assert_eq!(
            config.device_cache_path(),
            PathBuf::from("/tmp/inform/data/devices.json")
        );
    }

    #[test]
    fn test_load_creates_default_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("daemon.toml");

        let config = Config::load(Some(&path)).unwrap();

        assert!(path.exists());
        assert_eq!(config.supervisor_config().retry_interval, Duration::from_secs(600));
        let reloaded = Config::load(Some(&path)).unwrap();
        assert_eq!(reloaded.server.url, config.server.url);
    }
}

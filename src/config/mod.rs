//! Configuration module
//!
//! Handles loading and saving CastNet configuration.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::{CHAT_CONTROL_PORT, DISCOVERY_PORT, FILE_SHARING_PORT, MULTICAST_BASE};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Network settings
    #[serde(default)]
    pub network: NetworkConfig,

    /// Shared-file settings
    #[serde(default)]
    pub files: FilesConfig,

    /// Chat settings
    #[serde(default)]
    pub chat: ChatConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Service name announced to discovery clients
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Enable verbose logging
    #[serde(default)]
    pub verbose: bool,
}

fn default_service_name() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("{}'s File Sharing Service", host)
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            verbose: false,
        }
    }
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// UDP port for service discovery
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    /// TCP port for the file-sharing service
    #[serde(default = "default_file_port")]
    pub file_port: u16,
    /// TCP port for the chat-room directory
    #[serde(default = "default_directory_port")]
    pub directory_port: u16,
    /// Interface to bind to (default: all)
    pub bind_address: Option<String>,
    /// Per-read idle timeout in ms
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// Discovery reply wait in ms
    #[serde(default = "default_discovery_wait")]
    pub discovery_wait_ms: u64,
}

fn default_discovery_port() -> u16 {
    DISCOVERY_PORT
}

fn default_file_port() -> u16 {
    FILE_SHARING_PORT
}

fn default_directory_port() -> u16 {
    CHAT_CONTROL_PORT
}

fn default_read_timeout() -> u64 {
    4000
}

fn default_discovery_wait() -> u64 {
    5000
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            discovery_port: default_discovery_port(),
            file_port: default_file_port(),
            directory_port: default_directory_port(),
            bind_address: None,
            read_timeout_ms: default_read_timeout(),
            discovery_wait_ms: default_discovery_wait(),
        }
    }
}

/// Shared-file configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    /// Directory the file service shares
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

fn default_root() -> PathBuf {
    PathBuf::from("./shared")
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
        }
    }
}

/// Chat configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Display name prefixed to outgoing chat messages
    #[serde(default = "default_display_name")]
    pub display_name: String,
    /// Default multicast group for ad-hoc chats
    #[serde(default = "default_group")]
    pub default_group: Ipv4Addr,
    /// Default multicast port for ad-hoc chats
    #[serde(default = "default_directory_port")]
    pub default_port: u16,
}

fn default_display_name() -> String {
    "Anonymous".to_string()
}

fn default_group() -> Ipv4Addr {
    MULTICAST_BASE
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            display_name: default_display_name(),
            default_group: default_group(),
            default_port: default_directory_port(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("castnet/config.toml")),
            Some(PathBuf::from("./castnet.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> String {
    let config = Config {
        general: GeneralConfig {
            service_name: "Lab File Sharing Service".to_string(),
            verbose: false,
        },
        files: FilesConfig {
            root: PathBuf::from("/srv/castnet/shared"),
        },
        chat: ChatConfig {
            display_name: "alice".to_string(),
            ..Default::default()
        },
        ..Default::default()
    };

    toml::to_string_pretty(&config).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.discovery_port, DISCOVERY_PORT);
        assert_eq!(config.network.file_port, FILE_SHARING_PORT);
        assert_eq!(config.network.directory_port, CHAT_CONTROL_PORT);
        assert_eq!(config.chat.default_group, MULTICAST_BASE);
    }

    #[test]
    fn test_save_and_load() {
        let config = Config::default();
        let file = NamedTempFile::new().unwrap();

        config.save(file.path()).unwrap();

        let loaded = Config::load(file.path()).unwrap();
        assert_eq!(loaded.network.file_port, config.network.file_port);
        assert_eq!(loaded.chat.display_name, config.chat.display_name);
    }

    #[test]
    fn test_sample_config() {
        let sample = generate_sample_config();
        let parsed: Config = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.general.service_name, "Lab File Sharing Service");
        assert_eq!(parsed.chat.display_name, "alice");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed: Config = toml::from_str("[network]\nfile_port = 40001\n").unwrap();
        assert_eq!(parsed.network.file_port, 40001);
        assert_eq!(parsed.network.discovery_port, DISCOVERY_PORT);
        assert_eq!(parsed.chat.display_name, "Anonymous");
    }
}

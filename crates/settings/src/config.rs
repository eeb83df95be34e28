//! Client configuration.
//!
//! Read from `~/.config/zher/config.json`. A missing file gives defaults; an
//! unparsable one gives defaults with a warning. Command-line flags override
//! individual fields afterwards.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Port the room server listens on by default.
pub const DEFAULT_PORT: u16 = 4836;

/// Errors from configuration I/O.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no config directory (HOME is not set)")]
    NoConfigDir,
}

/// Client configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    /// HTTP origin of the room server.
    pub server_url: String,
    /// Room code sent on connect, when the server requires one.
    pub room_code: Option<String>,
    /// Where downloaded files are written.
    pub download_dir: PathBuf,
    /// Where archives are spooled while being offered.
    pub temp_dir: PathBuf,
    /// Key-value storage file (session id, theme).
    pub storage_path: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let base = zher_dir().unwrap_or_else(|| PathBuf::from(".zher"));
        Self {
            server_url: format!("http://localhost:{DEFAULT_PORT}"),
            room_code: None,
            download_dir: default_download_dir(),
            temp_dir: std::env::temp_dir(),
            storage_path: base.join("storage.json"),
        }
    }
}

impl ClientConfig {
    /// Loads the configuration from the default location.
    pub fn load() -> Self {
        match default_config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                warn!("no config directory, using defaults");
                Self::default()
            }
        }
    }

    /// Loads the configuration from `path`, falling back to defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Self::default();
        }
        let parsed = std::fs::read_to_string(path)
            .map_err(ConfigError::from)
            .and_then(|content| serde_json::from_str::<Self>(&content).map_err(ConfigError::from));
        match parsed {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read config, using defaults");
                Self::default()
            }
        }
    }

    /// Saves the configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = default_config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

/// Returns `~/.config/zher/config.json` (platform equivalent elsewhere).
pub fn default_config_path() -> Option<PathBuf> {
    zher_dir().map(|d| d.join("config.json"))
}

fn zher_dir() -> Option<PathBuf> {
    config_dir().map(|d| d.join("zher"))
}

fn default_download_dir() -> PathBuf {
    std::env::var("HOME")
        .ok()
        .or_else(|| std::env::var("USERPROFILE").ok())
        .map(|h| PathBuf::from(h).join("Downloads"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns the platform-specific config directory.
fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(".config"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.server_url, "http://localhost:4836");
        assert!(config.room_code.is_none());
        assert!(config.storage_path.ends_with("storage.json"));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = ClientConfig::load_from(&tmp.path().join("config.json"));
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn unparsable_file_gives_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(ClientConfig::load_from(&path), ClientConfig::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"serverUrl":"http://10.0.0.2:4836","roomCode":"1234"}"#)
            .unwrap();

        let config = ClientConfig::load_from(&path);
        assert_eq!(config.server_url, "http://10.0.0.2:4836");
        assert_eq!(config.room_code.as_deref(), Some("1234"));
        assert_eq!(config.temp_dir, ClientConfig::default().temp_dir);
    }

    #[test]
    fn save_and_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.json");

        let config = ClientConfig {
            server_url: "http://192.168.1.5:4836".into(),
            room_code: Some("9876".into()),
            download_dir: tmp.path().join("dl"),
            temp_dir: tmp.path().join("tmp"),
            storage_path: tmp.path().join("storage.json"),
        };
        config.save_to(&path).unwrap();

        assert_eq!(ClientConfig::load_from(&path), config);
    }
}

//! TOML configuration for both binaries.
//!
//! The file lives at `<config_dir>/config.toml` unless `--config` says
//! otherwise. Every key is optional:
//!
//! ```toml
//! log_level = "info"
//!
//! [relay]
//! listen = "127.0.0.1:8080"
//! snapshot = "/var/lib/gridsync/relay.json"
//!
//! [client]
//! relay = "127.0.0.1:8080"
//! name = "Ann"
//! reconnect_delay_ms = 3000
//! connect_timeout_ms = 5000
//! snapshot = "/home/ann/sheet.json"
//! ```

use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{GridsyncError, Result};

pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;
pub const SNAPSHOT_FILE_NAME: &str = "spreadsheet.json";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "gridsync")
}

/// Default config file location.
pub fn default_config_path() -> Option<PathBuf> {
    let proj = project_dirs()?;
    let mut path = proj.config_dir().to_path_buf();
    path.push("config.toml");
    Some(path)
}

/// Directory for the client snapshot and identity.
pub fn data_dir() -> Option<PathBuf> {
    project_dirs().map(|proj| proj.data_dir().to_path_buf())
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub relay: RelayConfig,
    pub client: ClientConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: "info".to_string(),
            relay: RelayConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub listen: String,
    /// When set, the relay mirror is loaded from and saved to this file.
    pub snapshot: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            listen: DEFAULT_ADDR.to_string(),
            snapshot: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub relay: String,
    pub name: Option<String>,
    pub reconnect_delay_ms: u64,
    pub connect_timeout_ms: u64,
    pub snapshot: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            relay: DEFAULT_ADDR.to_string(),
            name: None,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            snapshot: None,
        }
    }
}

impl ClientConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Configured snapshot path, else `<data_dir>/spreadsheet.json`.
    pub fn snapshot_path(&self) -> Option<PathBuf> {
        self.snapshot
            .clone()
            .or_else(|| data_dir().map(|dir| dir.join(SNAPSHOT_FILE_NAME)))
    }
}

/// Parse config file contents.
pub fn parse_config(content: &str, path: &Path) -> Result<Config> {
    toml::from_str(content).map_err(|source| GridsyncError::Config {
        path: path.to_path_buf(),
        source,
    })
}

/// Load configuration, falling back to defaults.
///
/// Problems never stop the program: they are returned as warnings. A
/// missing default file is silent; a missing explicit file is reported.
pub fn load_config(explicit: Option<&Path>) -> (Config, Vec<String>) {
    let mut warnings = Vec::new();
    let Some(path) = explicit.map(Path::to_path_buf).or_else(default_config_path) else {
        return (Config::default(), warnings);
    };

    if !path.exists() {
        if explicit.is_some() {
            warnings.push(format!("Config file not found: {}", path.display()));
        }
        return (Config::default(), warnings);
    }

    let config = match std::fs::read_to_string(&path) {
        Ok(content) => match parse_config(&content, &path) {
            Ok(config) => config,
            Err(err) => {
                warnings.push(err.to_string());
                Config::default()
            }
        },
        Err(err) => {
            warnings.push(format!("Failed to read {}: {}", path.display(), err));
            Config::default()
        }
    };
    (config, warnings)
}

use crate::backend::StreamServiceSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Current config schema version for future migration support
const CONFIG_VERSION: u32 = 1;

/// Default obs-websocket port (OBS 28+)
pub const DEFAULT_PORT: u16 = 4455;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Schema version for migration support
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub stream: StreamServiceSettings,
}

/// Where the obs-websocket server listens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            password: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            connection: ConnectionConfig::default(),
            stream: StreamServiceSettings::default(),
        }
    }
}

/// Returns the path to the config file: ~/.config/{app_name}/config.toml
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(crate::APP_NAME).join("config.toml"))
}

/// Save config to the given path, or the default location.
/// Uses atomic writes (write to temp, then rename) to prevent corruption.
/// Keeps a .bak backup of the previous config.
pub fn save_config(config: &Config, path: Option<&Path>) -> Result<PathBuf> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_path().context("Could not determine config directory")?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }

    let contents = toml::to_string_pretty(config)
        .context("Failed to serialize config to TOML")?;

    let tmp_path = path.with_extension("toml.tmp");
    let bak_path = path.with_extension("toml.bak");

    fs::write(&tmp_path, &contents)
        .with_context(|| format!("Failed to write temp config file: {}", tmp_path.display()))?;

    if path.exists() {
        let _ = fs::remove_file(&bak_path);
        fs::rename(&path, &bak_path)
            .with_context(|| format!("Failed to backup config file: {}", path.display()))?;
    }

    fs::rename(&tmp_path, &path)
        .with_context(|| format!("Failed to finalize config file: {}", path.display()))?;

    Ok(path)
}

/// Load config from the given path (or the default location), falling back
/// to defaults if it doesn't exist.
/// If the main config is corrupted, attempts to load from backup.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match config_path() {
            Some(p) => p,
            None => return Ok(Config::default()),
        },
    };
    let bak_path = path.with_extension("toml.bak");

    if !path.exists() {
        if bak_path.exists() {
            warn!(path = %bak_path.display(), "Main config missing, loading from backup");
            return load_from_path(&bak_path);
        }
        return Ok(Config::default());
    }

    match load_from_path(&path) {
        Ok(config) => Ok(config),
        Err(e) => {
            if bak_path.exists() {
                warn!(error = %e, "Main config corrupted, loading from backup");
                return load_from_path(&bak_path);
            }
            Err(e)
        }
    }
}

fn load_from_path(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn parse_config(contents: &str) -> Result<Config> {
    let config: Config = toml::from_str(contents)?;

    // Future: handle migrations based on config.version
    if config.version > CONFIG_VERSION {
        warn!(
            version = config.version,
            supported = CONFIG_VERSION,
            "Config version is newer than supported version"
        );
    }

    Ok(config)
}

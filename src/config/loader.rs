// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{EngineConfig, RawEngineConfig};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw
/// `RawEngineConfig`.
///
/// This only performs TOML deserialization; it does **not** validate. Use
/// [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawEngineConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawEngineConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// A relative `[scripts].root` is resolved against the directory holding the
/// config file, so `vmprov --config deploy/Vmprov.toml` finds
/// `deploy/scripts`.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<EngineConfig> {
    let path = path.as_ref();
    let raw_config = load_from_path(path)?;
    let mut config = EngineConfig::try_from(raw_config)?;

    if config.scripts.root.is_relative() {
        config.scripts.root = config_root_dir(path).join(&config.scripts.root);
    }
    Ok(config)
}

/// Like [`load_and_validate`], but a missing file yields the defaults.
///
/// Any other failure (unreadable file, bad TOML, invalid values) is still an
/// error.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<EngineConfig> {
    let path = path.as_ref();
    if path.exists() {
        return load_and_validate(path);
    }
    debug!(path = ?path, "no config file, using defaults");
    let mut config = EngineConfig::default();
    config.scripts.root = config_root_dir(path).join(&config.scripts.root);
    Ok(config)
}

/// Helper to resolve a default config path.
///
/// Currently this just returns `Vmprov.toml` in the current working
/// directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Vmprov.toml")
}

/// Directory a config file lives in; a bare filename means the current
/// working directory.
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

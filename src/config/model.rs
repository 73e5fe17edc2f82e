// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::session::SessionOptions;

/// Configuration as read from `Vmprov.toml`, before validation.
///
/// ```toml
/// [pool]
/// min_size = 1
/// max_size = 3
///
/// [scripts]
/// root = "scripts"
/// extension = "lua"
///
/// [session]
/// poll_interval_ms = 100
/// stop_grace_ms = 5000
/// timeout_secs = 1800
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawEngineConfig {
    #[serde(default)]
    pub pool: PoolSection,

    #[serde(default)]
    pub scripts: ScriptsSection,

    #[serde(default)]
    pub session: SessionSection,
}

/// Validated engine configuration.
///
/// Built from [`RawEngineConfig`] through `TryFrom`, or via `Default`.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub pool: PoolSection,
    pub scripts: ScriptsSection,
    pub session: SessionSection,
}

impl EngineConfig {
    pub(crate) fn new_unchecked(
        pool: PoolSection,
        scripts: ScriptsSection,
        session: SessionSection,
    ) -> Self {
        Self {
            pool,
            scripts,
            session,
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            poll_interval: Duration::from_millis(self.session.poll_interval_ms),
            stop_grace: Duration::from_millis(self.session.stop_grace_ms),
            timeout: self.session.timeout_secs.map(Duration::from_secs),
        }
    }
}

/// `[pool]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolSection {
    /// Interpreters opened eagerly when the pool starts.
    #[serde(default = "default_min_size")]
    pub min_size: usize,

    /// Upper bound on live interpreters; callers beyond it wait.
    #[serde(default = "default_max_size")]
    pub max_size: usize,
}

fn default_min_size() -> usize {
    1
}

fn default_max_size() -> usize {
    3
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            min_size: default_min_size(),
            max_size: default_max_size(),
        }
    }
}

/// `[scripts]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptsSection {
    /// Script directory. Relative paths are taken from the config file's
    /// directory.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Script file extension, without the dot.
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_root() -> PathBuf {
    PathBuf::from("scripts")
}

fn default_extension() -> String {
    "lua".to_string()
}

impl Default for ScriptsSection {
    fn default() -> Self {
        Self {
            root: default_root(),
            extension: default_extension(),
        }
    }
}

/// `[session]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionSection {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,

    /// No limit when absent.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_stop_grace_ms() -> u64 {
    5_000
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            stop_grace_ms: default_stop_grace_ms(),
            timeout_secs: None,
        }
    }
}

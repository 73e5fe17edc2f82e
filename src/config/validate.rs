// src/config/validate.rs

use crate::config::model::{EngineConfig, RawEngineConfig};
use crate::errors::{Result, VmprovError};

impl TryFrom<RawEngineConfig> for EngineConfig {
    type Error = VmprovError;

    fn try_from(raw: RawEngineConfig) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;
        Ok(EngineConfig::new_unchecked(raw.pool, raw.scripts, raw.session))
    }
}

pub fn validate_config(cfg: &RawEngineConfig) -> Result<()> {
    validate_pool(cfg)?;
    validate_scripts(cfg)?;
    validate_session(cfg)?;
    Ok(())
}

fn validate_pool(cfg: &RawEngineConfig) -> Result<()> {
    let pool = &cfg.pool;
    if pool.max_size == 0 {
        return Err(VmprovError::ConfigError(
            "[pool].max_size must be >= 1 (got 0)".to_string(),
        ));
    }
    if pool.min_size > pool.max_size {
        return Err(VmprovError::ConfigError(format!(
            "[pool].min_size ({}) must not exceed max_size ({})",
            pool.min_size, pool.max_size
        )));
    }
    Ok(())
}

fn validate_scripts(cfg: &RawEngineConfig) -> Result<()> {
    let ext = cfg.scripts.extension.trim();
    if ext.is_empty() {
        return Err(VmprovError::ConfigError(
            "[scripts].extension must not be empty".to_string(),
        ));
    }
    if ext.starts_with('.') {
        return Err(VmprovError::ConfigError(format!(
            "[scripts].extension is given without the dot (got '{ext}')"
        )));
    }
    Ok(())
}

fn validate_session(cfg: &RawEngineConfig) -> Result<()> {
    if cfg.session.poll_interval_ms == 0 {
        return Err(VmprovError::ConfigError(
            "[session].poll_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.session.timeout_secs == Some(0) {
        return Err(VmprovError::ConfigError(
            "[session].timeout_secs must be >= 1; omit it for no limit".to_string(),
        ));
    }
    Ok(())
}

// src/store.rs

//! Configuration document storage.
//!
//! The orchestrator talks to a [`ConfigurationStore`] instead of reading
//! files itself, so tests can hand it documents from memory. Load and save
//! are separate operations that report failure explicitly.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use chrono::Utc;
use tracing::debug;

use crate::errors::StoreError;
use crate::vm::VmConfiguration;

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

pub trait ConfigurationStore: Send + Sync {
    fn load<'a>(&'a self, path: &'a Path) -> StoreFuture<'a, VmConfiguration>;

    fn save<'a>(&'a self, path: &'a Path, config: &'a VmConfiguration) -> StoreFuture<'a, ()>;
}

/// Stores documents as pretty-printed JSON files.
#[derive(Debug, Clone, Default)]
pub struct JsonConfigurationStore;

impl JsonConfigurationStore {
    pub fn new() -> Self {
        Self
    }
}

impl ConfigurationStore for JsonConfigurationStore {
    fn load<'a>(&'a self, path: &'a Path) -> StoreFuture<'a, VmConfiguration> {
        Box::pin(async move {
            let contents = tokio::fs::read_to_string(path).await.map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    StoreError::NotFound(path.to_path_buf())
                } else {
                    StoreError::Read {
                        path: path.to_path_buf(),
                        source,
                    }
                }
            })?;

            let config: VmConfiguration =
                serde_json::from_str(&contents).map_err(|source| StoreError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;

            debug!(path = ?path, vm = %config.name, "configuration loaded");
            Ok(config)
        })
    }

    /// Writes `config` with `metadata.modified` stamped to now (and
    /// `metadata.created` filled in if it was empty). Parent directories are
    /// created as needed.
    fn save<'a>(&'a self, path: &'a Path, config: &'a VmConfiguration) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut stamped = config.clone();
            let now = Utc::now();
            stamped.metadata.created.get_or_insert(now);
            stamped.metadata.modified = Some(now);

            let json = serde_json::to_string_pretty(&stamped).map_err(StoreError::Serialize)?;

            let write_err = |source| StoreError::Write {
                path: PathBuf::from(path),
                source,
            };
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
            }
            tokio::fs::write(path, json).await.map_err(write_err)?;

            debug!(path = ?path, vm = %stamped.name, "configuration saved");
            Ok(())
        })
    }
}

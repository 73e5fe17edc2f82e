// src/resolve/mod.rs

//! Script resolution.
//!
//! Maps a logical script identifier to something an execution session can
//! run:
//! - by free-form name, served from an index built by walking a script
//!   directory once ([`ScriptResolver::index_directory`]);
//! - by [`Role`], through a fixed table under the `role-configuration`
//!   subtree. Unknown roles fall back to the custom-vm script, so role
//!   resolution always yields *some* script.

pub mod role;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use crate::errors::ResolveError;
use crate::fs::FileSystem;

pub use role::{ROLE_CONFIGURATION_DIR, Role};

/// A script ready to be handed to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptHandle {
    /// Script text supplied directly by the caller.
    Inline { name: String, text: String },
    /// A script file; read when the session starts.
    File { name: String, path: PathBuf },
}

impl ScriptHandle {
    pub fn inline(name: impl Into<String>, text: impl Into<String>) -> Self {
        ScriptHandle::Inline {
            name: name.into(),
            text: text.into(),
        }
    }

    /// File handle named after the file stem.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        ScriptHandle::File { name, path }
    }

    /// Logical identifier used in logs and outcomes.
    pub fn name(&self) -> &str {
        match self {
            ScriptHandle::Inline { name, .. } | ScriptHandle::File { name, .. } => name,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            ScriptHandle::File { path, .. } => Some(path),
            ScriptHandle::Inline { .. } => None,
        }
    }
}

impl fmt::Display for ScriptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptHandle::Inline { name, .. } => write!(f, "{name} (inline)"),
            ScriptHandle::File { name, path } => write!(f, "{name} ({})", path.display()),
        }
    }
}

#[derive(Debug)]
pub struct ScriptResolver {
    fs: Arc<dyn FileSystem>,
    script_root: PathBuf,
    extension: String,
    /// Lowercased logical name → (original name, absolute path).
    index: RwLock<HashMap<String, (String, PathBuf)>>,
}

impl ScriptResolver {
    /// `extension` is matched case-insensitively and may be given with or
    /// without the leading dot.
    pub fn new(
        fs: Arc<dyn FileSystem>,
        script_root: impl Into<PathBuf>,
        extension: impl AsRef<str>,
    ) -> Self {
        Self {
            fs,
            script_root: script_root.into(),
            extension: extension.as_ref().trim_start_matches('.').to_lowercase(),
            index: RwLock::new(HashMap::new()),
        }
    }

    pub fn script_root(&self) -> &Path {
        &self.script_root
    }

    /// Walk `root` recursively and cache every script file by file stem.
    ///
    /// Replaces any previous index. Returns the number of scripts indexed.
    pub fn index_directory(&self, root: impl AsRef<Path>) -> Result<usize, ResolveError> {
        let root = root.as_ref();
        if !self.fs.is_dir(root) {
            return Err(ResolveError::DirectoryNotFound(root.to_path_buf()));
        }

        let files = self
            .fs
            .walk_files(root)
            .map_err(|e| ResolveError::Index(format!("{e:#}")))?;

        let mut index = HashMap::new();
        for file in files {
            if !self.is_script(&file) {
                continue;
            }
            let Some(stem) = file.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            let absolute = self
                .fs
                .canonicalize(&file)
                .map_err(|e| ResolveError::Index(format!("{e:#}")))?;

            match index.get(&stem.to_lowercase()) {
                Some((_, existing)) => {
                    warn!(
                        script = %stem,
                        kept = ?existing,
                        ignored = ?absolute,
                        "duplicate script name; keeping the first one found"
                    );
                }
                None => {
                    debug!(script = %stem, path = ?absolute, "indexed script");
                    index.insert(stem.to_lowercase(), (stem, absolute));
                }
            }
        }

        let count = index.len();
        *self.index.write().unwrap_or_else(|p| p.into_inner()) = index;
        info!(root = ?root, scripts = count, "script directory indexed");
        Ok(count)
    }

    /// Look a script up by logical name (case-insensitive) in the index.
    pub fn resolve_by_name(&self, name: &str) -> Result<ScriptHandle, ResolveError> {
        let index = self.index.read().unwrap_or_else(|p| p.into_inner());
        index
            .get(&name.trim().to_lowercase())
            .map(|(name, path)| ScriptHandle::File {
                name: name.clone(),
                path: path.clone(),
            })
            .ok_or_else(|| ResolveError::NotFound(name.to_string()))
    }

    /// Resolve the conventional script for `role`.
    ///
    /// Never fails; whether the file exists is checked when a session runs it.
    pub fn resolve_by_role(&self, role: &Role) -> ScriptHandle {
        let script_role = role.script_role();
        if !role.is_known() {
            debug!(role = %role, "unknown role; falling back to the custom-vm script");
        }
        ScriptHandle::File {
            name: script_role.slug().to_string(),
            path: self.script_root.join(self.role_relative_path(&script_role)),
        }
    }

    /// The fixed role table as `(role, path relative to the script root)`.
    pub fn role_table(&self) -> Vec<(Role, PathBuf)> {
        Role::KNOWN
            .iter()
            .map(|role| (role.clone(), self.role_relative_path(role)))
            .collect()
    }

    /// Current index as `(name, path)`, sorted by name.
    pub fn indexed(&self) -> Vec<(String, PathBuf)> {
        let index = self.index.read().unwrap_or_else(|p| p.into_inner());
        let mut entries: Vec<_> = index.values().cloned().collect();
        entries.sort_by_key(|(name, _)| name.to_lowercase());
        entries
    }

    fn role_relative_path(&self, role: &Role) -> PathBuf {
        Path::new(ROLE_CONFIGURATION_DIR).join(format!("{}.{}", role.slug(), self.extension))
    }

    fn is_script(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase() == self.extension)
            .unwrap_or(false)
    }
}

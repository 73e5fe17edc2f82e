// src/fs/mock.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Result, anyhow};

use super::FileSystem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    File,
    Dir,
}

/// In-memory directory tree. Paths are taken as given (no normalisation),
/// so tests should stick to absolute paths such as `/scripts/x.lua`.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    nodes: Arc<Mutex<BTreeMap<PathBuf, Node>>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file and all of its ancestor directories.
    pub fn add_file(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut nodes = self.lock();
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            nodes.insert(ancestor.to_path_buf(), Node::Dir);
        }
        nodes.insert(path.to_path_buf(), Node::File);
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut nodes = self.lock();
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            nodes.insert(ancestor.to_path_buf(), Node::Dir);
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<PathBuf, Node>> {
        self.nodes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn node(&self, path: &Path) -> Option<Node> {
        self.lock().get(path).copied()
    }
}

impl FileSystem for MemoryFileSystem {
    fn is_file(&self, path: &Path) -> bool {
        self.node(path) == Some(Node::File)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.node(path) == Some(Node::Dir)
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        match self.node(path) {
            Some(_) => Ok(path.to_path_buf()),
            None => Err(anyhow!("no such file or directory: {:?}", path)),
        }
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        if !self.is_dir(path) {
            return Err(anyhow!("not a directory: {:?}", path));
        }
        let nodes = self.lock();
        Ok(nodes
            .keys()
            .filter(|p| p.parent() == Some(path))
            .cloned()
            .collect())
    }
}

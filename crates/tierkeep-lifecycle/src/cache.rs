//! Registry of file replicas held in the local cache directory
//!
//! When a server runs in cache mode, object files fetched from remote
//! locations are kept under the cache directory, one file per node id.
//! The registry tracks each file's last access so the reaper can decide
//! which replicas are stale.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tierkeep_common::{Error, NodeId, Result};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::ports::CacheRegistry;

/// Individual cache entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Last time the replica was read
    pub access: DateTime<Utc>,
    /// Size of the cached file in bytes
    pub size: u64,
}

/// Whether `id` can name a file directly under the cache root
fn is_plain_file_name(id: &str) -> bool {
    !id.is_empty() && !id.contains(['/', '\\', '\0']) && !id.contains("..") && id != "."
}

/// Cached replicas keyed by node id
pub struct CacheMap {
    /// Cache directory
    root: PathBuf,
    /// Cached entries protected by RwLock
    entries: RwLock<HashMap<NodeId, CacheEntry>>,
    /// Source of access timestamps
    clock: Arc<dyn Clock>,
}

impl CacheMap {
    /// Create an empty registry rooted at `root`
    pub fn new(root: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            root: root.into(),
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Build the registry from the files already present in `root`
    ///
    /// Each regular file is one cached replica named by its node id; its
    /// modification time seeds the last access. Hidden files and
    /// subdirectories are skipped.
    pub fn load(root: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self> {
        let cache = Self::new(root, clock);
        std::fs::create_dir_all(&cache.root)?;

        let mut entries = cache.entries.write();
        for dirent in std::fs::read_dir(&cache.root)? {
            let dirent = dirent?;
            let name = dirent.file_name();
            let Some(name) = name.to_str() else {
                debug!("Skipping non UTF-8 cache file {:?}", dirent.path());
                continue;
            };
            if name.starts_with('.') || !is_plain_file_name(name) {
                continue;
            }
            let meta = dirent.metadata()?;
            if !meta.is_file() {
                debug!("Skipping non-file cache entry {}", name);
                continue;
            }
            let access = meta.modified().map(DateTime::<Utc>::from)?;
            entries.insert(
                NodeId::new(name),
                CacheEntry {
                    access,
                    size: meta.len(),
                },
            );
        }
        info!(
            "Loaded {} cached files from {}",
            entries.len(),
            cache.root.display()
        );
        drop(entries);

        Ok(cache)
    }

    /// Cache directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the cached file for `id`; `None` if the id would escape the root
    pub fn path_for(&self, id: &NodeId) -> Option<PathBuf> {
        is_plain_file_name(id.as_str()).then(|| self.root.join(id.as_str()))
    }

    /// Get the current number of entries in the cache
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Register a replica that was just written to the cache directory
    pub fn insert(&self, id: NodeId, size: u64) -> Result<()> {
        if !is_plain_file_name(id.as_str()) {
            return Err(Error::invalid_argument(format!(
                "node id {id:?} is not a valid cache file name"
            )));
        }
        let access = self.clock.now();
        self.entries.write().insert(id, CacheEntry { access, size });
        Ok(())
    }

    /// Look up an entry without counting it as an access
    pub fn get(&self, id: &NodeId) -> Option<CacheEntry> {
        self.entries.read().get(id).cloned()
    }

    /// Check if a replica is cached
    pub fn contains(&self, id: &NodeId) -> bool {
        self.entries.read().contains_key(id)
    }
}

impl CacheRegistry for CacheMap {
    fn snapshot(&self) -> Vec<(NodeId, DateTime<Utc>)> {
        self.entries
            .read()
            .iter()
            .map(|(id, entry)| (id.clone(), entry.access))
            .collect()
    }

    fn remove(&self, id: &NodeId) -> bool {
        if self.entries.write().remove(id).is_none() {
            return false;
        }

        let Some(path) = self.path_for(id) else {
            warn!("Refusing to delete cache file for unsafe id {:?}", id);
            return true;
        };
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Cached file {} already gone", path.display());
            }
            Err(e) => warn!("Failed to delete cached file {}: {}", path.display(), e),
        }
        true
    }
}

//! Cache-aside storage of resolved folders.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::{CacheBackend, NullCache};
use crate::folder::Folder;

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Caches resolved folders together with their listings.
///
/// Each entry is paired with a stamp of its config root (the config salt,
/// which rotates on every password change). An entry whose stamp is missing
/// or differs is dropped as a miss, so invalidating one config root
/// invalidates every cached folder inheriting from it.
#[derive(Clone)]
pub struct FolderCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
    enabled: bool,
}

impl std::fmt::Debug for FolderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FolderCache")
            .field("ttl", &self.ttl)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl Default for FolderCache {
    fn default() -> Self {
        Self::disabled()
    }
}

fn folder_key(rel_path: &str) -> String {
    format!("folder:/{rel_path}")
}

fn stamp_key(config_root_path: &str) -> String {
    format!("config:/{config_root_path}")
}

impl FolderCache {
    /// Create a cache over `backend`.
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self {
            backend,
            ttl,
            enabled: true,
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(Arc::new(NullCache), DEFAULT_TTL)
        }
    }

    /// Whether entries are stored at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Entry lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a folder. Hits always carry materialized listings.
    pub fn get(&self, rel_path: &str) -> Option<Folder> {
        let key = folder_key(rel_path);
        let bytes = match self.backend.get(&key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(folder = %rel_path, "folder cache miss");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "folder cache lookup failed");
                return None;
            }
        };

        let folder: Folder = match serde_json::from_slice(&bytes) {
            Ok(folder) => folder,
            Err(e) => {
                warn!(error = %e, folder = %rel_path, "dropping undecodable cache entry");
                let _ = self.backend.delete(&key);
                return None;
            }
        };

        if !folder.is_materialized() {
            return None;
        }

        match self.backend.get(&stamp_key(&folder.config_root_path)) {
            Ok(Some(stamp)) if stamp == folder.config.salt.as_bytes() => {
                debug!(folder = %rel_path, "folder cache hit");
                Some(folder)
            }
            Ok(_) => {
                debug!(folder = %rel_path, "dropping cached folder with a stale config");
                // Populators insert only when absent, so the stale entry must go.
                let _ = self.backend.delete(&key);
                None
            }
            Err(e) => {
                warn!(error = %e, "folder cache lookup failed");
                None
            }
        }
    }

    /// Store a folder unless a fresher entry already exists.
    ///
    /// Listings are materialized first so a hit never needs a filesystem
    /// fallback. Best effort: failures are logged and dropped.
    pub async fn put(&self, folder: &Folder) {
        self.store(folder, false).await;
    }

    /// Store a folder, overwriting any existing entry.
    ///
    /// Used right after a mutation: the fresh entry and stamp make a
    /// slower populator holding older data lose its insert-if-absent.
    pub async fn put_force(&self, folder: &Folder) {
        self.store(folder, true).await;
    }

    async fn store(&self, folder: &Folder, force: bool) {
        if !self.enabled {
            return;
        }

        let mut entry = folder.clone();
        if let Err(e) = entry.materialize().await {
            warn!(error = %e, folder = %folder.rel_path, "cannot list folder for caching");
            return;
        }

        // Thumbnail bytes are large and read from the metadata files anyway.
        if let Some(files) = entry.cached_files.as_mut() {
            for thumbnail in files.iter_mut().filter_map(|f| f.thumbnail.as_mut()) {
                thumbnail.strip_data();
            }
        }

        let bytes = match serde_json::to_vec(&entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "cannot encode folder for caching");
                return;
            }
        };

        let key = folder_key(&entry.rel_path);
        let stamp = stamp_key(&entry.config_root_path);
        let salt = entry.config.salt.as_bytes().to_vec();

        let result = if force {
            self.backend
                .set(&key, bytes, self.ttl)
                .and_then(|_| self.backend.set(&stamp, salt, self.ttl))
        } else {
            self.backend
                .set_if_absent(&key, bytes, self.ttl)
                .and_then(|_| self.backend.set_if_absent(&stamp, salt, self.ttl))
                .map(|_| ())
        };

        match result {
            Ok(()) => debug!(folder = %entry.rel_path, force, "folder cached"),
            Err(e) => warn!(error = %e, "folder cache write failed"),
        }
    }

    /// Drop the entry of one folder.
    pub fn invalidate(&self, rel_path: &str) {
        if let Err(e) = self.backend.delete(&folder_key(rel_path)) {
            warn!(error = %e, folder = %rel_path, "folder cache invalidation failed");
        }
    }

    /// Drop a config root's entry and, through its stamp, every cached
    /// folder inheriting its config.
    pub fn invalidate_config(&self, config_root_path: &str) {
        self.invalidate(config_root_path);
        if let Err(e) = self.backend.delete(&stamp_key(config_root_path)) {
            warn!(error = %e, folder = %config_root_path, "config stamp invalidation failed");
        }
    }
}

//! Test helpers for store integration tests.
//!
//! Every test gets its own storage root in a temporary directory:
//!
//! ```text
//! /            public, no writes, subfolders allowed
//! ├── gallery/ own config: READ_PASSWORD / WRITE_PASSWORD
//! │   └── sub/ inherits gallery
//! └── other/   own config: other passwords
//! ```

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use folderkeep::cache::CacheBackend;
use folderkeep::{
    AccessKind, CapabilityToken, CancellationToken, FolderCache, FolderConfig, MemoryCache, Store,
};

/// Read password of `gallery`.
pub const READ_PASSWORD: &str = "gallery-viewer";

/// Write password of `gallery`.
pub const WRITE_PASSWORD: &str = "Correct-Horse-Battery-9";

/// Write password of `other`.
pub const OTHER_WRITE_PASSWORD: &str = "Another-Strong-Secret-42";

/// A store over a temporary root.
pub struct TestStore {
    pub dir: TempDir,
    pub store: Store,
    pub backend: Arc<MemoryCache>,
}

impl TestStore {
    /// Storage root.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Token with write access to `gallery`.
    pub async fn gallery_writer(&self) -> CapabilityToken {
        self.store
            .authenticate("gallery", AccessKind::Write, WRITE_PASSWORD)
            .await
            .unwrap()
    }

    /// Token with read and write access to `gallery`.
    pub async fn gallery_owner(&self) -> CapabilityToken {
        let mut token = self
            .store
            .authenticate("gallery", AccessKind::Read, READ_PASSWORD)
            .await
            .unwrap();
        token.merge(self.gallery_writer().await);
        token
    }

    /// Whether the cache holds an entry for `rel_path`.
    pub fn is_cached(&self, rel_path: &str) -> bool {
        self.backend
            .get(&format!("folder:/{rel_path}"))
            .unwrap()
            .is_some()
    }

    /// Wait for the background cache population of `rel_path`.
    pub async fn wait_cached(&self, rel_path: &str) -> bool {
        for _ in 0..100 {
            if self.is_cached(rel_path) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

/// Provision the standard tree with an in-memory cache.
pub async fn setup() -> TestStore {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(MemoryCache::new());
    let cache = FolderCache::new(backend.clone(), Duration::from_secs(3600));
    let store = Store::new(dir.path()).with_cache(cache);

    store
        .init_root(FolderConfig::public().with_subfolders(true))
        .await
        .unwrap();
    store
        .init_folder(
            "gallery",
            FolderConfig::with_passwords(READ_PASSWORD, WRITE_PASSWORD)
                .unwrap()
                .with_subfolders(true),
        )
        .await
        .unwrap();
    let writer = store
        .authenticate("gallery", AccessKind::Write, WRITE_PASSWORD)
        .await
        .unwrap();
    store
        .create_subfolder("gallery", &writer, "sub")
        .await
        .unwrap();
    store
        .init_folder(
            "other",
            FolderConfig::with_passwords("", OTHER_WRITE_PASSWORD).unwrap(),
        )
        .await
        .unwrap();

    TestStore {
        dir,
        store,
        backend,
    }
}

/// A token that is never cancelled.
pub fn no_cancel() -> CancellationToken {
    CancellationToken::new()
}

/// Names of the regular files directly in `dir`.
pub fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Assert every storage key in `dir` has both artifacts or neither.
pub fn assert_pairs_complete(dir: &Path) {
    for name in entries(dir) {
        if let Some(stem) = name.strip_suffix(".json") {
            assert!(dir.join(format!("{stem}.bin")).exists(), "{name} has no blob");
        }
        if let Some(stem) = name.strip_suffix(".bin") {
            assert!(dir.join(format!("{stem}.json")).exists(), "{name} has no metadata");
        }
    }
}

/// Assert no upload staging files are left in the root.
pub fn assert_no_staging(root: &Path) {
    let staged: Vec<_> = entries(root)
        .into_iter()
        .filter(|n| n.starts_with(".upload-"))
        .collect();
    assert!(staged.is_empty(), "staging files left: {staged:?}");
}

//! folderkeep - hierarchical password-protected file store
//!
//! Folders form a tree on the filesystem. Each folder either owns an access
//! config (`.config`) or inherits the closest ancestor's. Files are stored as
//! a metadata record and a content blob named by a deterministic storage key,
//! and folder listings are served through a best-effort cache.

pub mod auth;
pub mod cache;
pub mod config;
pub mod download;
pub mod error;
pub mod file;
pub mod folder;
pub mod lock;
pub mod logging;
pub mod service;
pub mod thumbnail;

pub use auth::{authorize, issue_token, CapabilityToken, Grant, HeuristicEstimator, StrengthEstimator};
pub use cache::{CacheBackend, CacheError, FolderCache, MemoryCache, NullCache};
pub use config::Config;
pub use download::Downloader;
pub use error::{Result, StoreError};
pub use file::{derive_storage_key, File, FileStore, MimeDetector, SniffingDetector, ThumbnailRecord};
pub use folder::{resolve, AccessKind, Folder, FolderConfig};
pub use lock::{LockGuard, ResourceLock};
pub use service::{FileEdit, Listing, OpenedFile, Store, UploadRequest};
pub use thumbnail::{GeneratedThumbnail, ThumbnailCache, ThumbnailGenerator};
pub use tokio_util::sync::CancellationToken;

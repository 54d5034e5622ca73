//! File storage module for folderkeep.
//!
//! This module provides:
//! - File metadata records and storage key derivation
//! - Content type detection
//! - The two-artifact [`FileStore`] with rollback on failure

pub mod metadata;
pub mod mime;
mod store;

pub use metadata::{derive_storage_key, File, ThumbnailRecord};
pub use mime::{MimeDetector, SniffingDetector};
pub use store::{read_listing, FileStore};

//! File metadata records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::folder::{path, KEY_NAMESPACE};

/// Derive the storage key of a file from its parent folder and name.
///
/// The key is a UUID v5 of the logical path `parent/name`, so the same
/// name in the same folder always lands in the same slot.
pub fn derive_storage_key(parent: &str, name: &str) -> Uuid {
    Uuid::new_v5(&KEY_NAMESPACE, path::join(parent, name).as_bytes())
}

/// A cached thumbnail.
///
/// A record without data and MIME type marks a failed generation. Listing
/// caches keep records with the data stripped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailRecord {
    /// Encoded image bytes.
    #[serde(default)]
    pub data: Vec<u8>,
    /// MIME type of `data`.
    #[serde(default)]
    pub mime: String,
    /// Width in pixels.
    #[serde(default)]
    pub width: u32,
    /// Height in pixels.
    #[serde(default)]
    pub height: u32,
    /// When generation was last attempted.
    pub generated_at: DateTime<Utc>,
}

impl ThumbnailRecord {
    /// A negative entry stamped now.
    pub fn failed() -> Self {
        Self {
            data: Vec::new(),
            mime: String::new(),
            width: 0,
            height: 0,
            generated_at: Utc::now(),
        }
    }

    /// Whether this records a failed generation.
    pub fn is_negative(&self) -> bool {
        self.data.is_empty() && self.mime.is_empty()
    }

    /// Whether the image bytes are present.
    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }

    /// Drop the image bytes, keeping the rest of the record.
    pub fn strip_data(&mut self) {
        self.data = Vec::new();
    }
}

/// Metadata of a stored file, persisted as `<storage_key>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    /// Logical path of the containing folder.
    pub folder: String,
    /// Display name.
    pub name: String,
    /// On-disk basename of both artifacts.
    pub storage_key: Uuid,
    /// Tags, unique and in insertion order.
    #[serde(default)]
    pub tags: Vec<String>,
    /// MIME type, empty until detected.
    #[serde(default)]
    pub mime: String,
    /// Content size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Upload time.
    pub uploaded_at: DateTime<Utc>,
    /// Readable without the folder's read password.
    #[serde(default)]
    pub public: bool,
    /// Cached thumbnail.
    #[serde(default)]
    pub thumbnail: Option<ThumbnailRecord>,
}

impl File {
    /// Create metadata for a new file in `folder`.
    pub fn new(folder: impl Into<String>, name: impl Into<String>) -> Self {
        let folder = folder.into();
        let name = name.into();
        Self {
            storage_key: derive_storage_key(&folder, &name),
            folder,
            name,
            tags: Vec::new(),
            mime: String::new(),
            size: 0,
            uploaded_at: Utc::now(),
            public: false,
            thumbnail: None,
        }
    }

    /// Set the tags.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_tags(tags);
        self
    }

    /// Set the MIME type.
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = mime.into();
        self
    }

    /// Mark the file public.
    pub fn with_public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    /// Replace the tags, dropping blanks and duplicates but keeping order.
    pub fn set_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.clear();
        for tag in tags {
            let tag = tag.into().trim().to_string();
            if !tag.is_empty() && !self.tags.contains(&tag) {
                self.tags.push(tag);
            }
        }
    }

    /// Whether the file carries `tag`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Logical path of the file.
    pub fn lower_path(&self) -> String {
        path::join(&self.folder, &self.name)
    }

    /// Basename of the metadata artifact.
    pub fn metadata_file_name(&self) -> String {
        format!("{}.json", self.storage_key)
    }

    /// Basename of the content artifact.
    pub fn blob_file_name(&self) -> String {
        format!("{}.bin", self.storage_key)
    }
}

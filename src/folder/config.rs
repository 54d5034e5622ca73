//! Per-folder access configuration persisted as `<folder>/.config`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;
use uuid::Uuid;

use crate::auth::password::{generate_salt, hash_password};
use crate::{Result, StoreError};

/// Name of the config file inside a config-owning folder.
pub const CONFIG_FILE_NAME: &str = ".config";

/// Default per-file upload limit in megabytes.
pub const DEFAULT_MAX_FILE_SIZE_MB: u64 = 10;

const MB: u64 = 1024 * 1024;

/// Kind of access a password or token grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessKind {
    /// Listing and downloading.
    Read,
    /// Uploading, editing, deleting and password changes.
    Write,
}

impl AccessKind {
    /// The other access kind.
    pub fn other(self) -> Self {
        match self {
            AccessKind::Read => AccessKind::Write,
            AccessKind::Write => AccessKind::Read,
        }
    }

    /// Get the kind as a string.
    pub fn as_str(self) -> &'static str {
        match self {
            AccessKind::Read => "read",
            AccessKind::Write => "write",
        }
    }
}

/// Access policy of a folder and every folder below it that does not
/// define its own.
///
/// An empty read hash makes the folder public. An empty write hash makes it
/// read-only for everyone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderConfig {
    /// Salt used for the most recently set password.
    pub salt: String,
    /// Argon2 PHC hash of the read password, or empty.
    #[serde(default)]
    pub read_password_hash: String,
    /// Argon2 PHC hash of the write password, or empty.
    #[serde(default)]
    pub write_password_hash: String,
    /// Per-file size limit in megabytes (0 = unlimited).
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
    /// Total folder size limit in megabytes (0 = unlimited).
    #[serde(default)]
    pub max_folder_size_mb: u64,
    /// Whether subfolders may be created.
    #[serde(default)]
    pub subfolders_allowed: bool,
}

fn default_max_file_size_mb() -> u64 {
    DEFAULT_MAX_FILE_SIZE_MB
}

impl Default for FolderConfig {
    fn default() -> Self {
        Self::public()
    }
}

impl FolderConfig {
    /// A publicly readable, non-writable config with default limits.
    pub fn public() -> Self {
        Self {
            salt: generate_salt(),
            read_password_hash: String::new(),
            write_password_hash: String::new(),
            max_file_size_mb: DEFAULT_MAX_FILE_SIZE_MB,
            max_folder_size_mb: 0,
            subfolders_allowed: false,
        }
    }

    /// A config protected by the given passwords. An empty read password
    /// keeps the folder public.
    ///
    /// No strength check is applied here; this is the operator provisioning
    /// path.
    pub fn with_passwords(read: &str, write: &str) -> Result<Self> {
        if !write.is_empty() && read == write {
            return Err(StoreError::PasswordsMustDiffer);
        }

        let mut config = Self::public();
        if !read.is_empty() {
            config.read_password_hash = hash_password(&config.salt, read)?;
        }
        if !write.is_empty() {
            config.write_password_hash = hash_password(&config.salt, write)?;
        }
        Ok(config)
    }

    /// Allow or forbid subfolders.
    pub fn with_subfolders(mut self, allowed: bool) -> Self {
        self.subfolders_allowed = allowed;
        self
    }

    /// Set the per-file and per-folder limits in megabytes.
    pub fn with_limits(mut self, max_file_size_mb: u64, max_folder_size_mb: u64) -> Self {
        self.max_file_size_mb = max_file_size_mb;
        self.max_folder_size_mb = max_folder_size_mb;
        self
    }

    /// Stored hash for an access kind.
    pub fn hash_for(&self, kind: AccessKind) -> &str {
        match kind {
            AccessKind::Read => &self.read_password_hash,
            AccessKind::Write => &self.write_password_hash,
        }
    }

    pub(crate) fn set_hash(&mut self, kind: AccessKind, hash: String) {
        match kind {
            AccessKind::Read => self.read_password_hash = hash,
            AccessKind::Write => self.write_password_hash = hash,
        }
    }

    /// Whether the folder can be read without a password.
    pub fn is_public(&self) -> bool {
        self.read_password_hash.is_empty()
    }

    /// Per-file limit in bytes, if any. Saturates at `u64::MAX`.
    pub fn max_file_size(&self) -> Option<u64> {
        (self.max_file_size_mb > 0).then(|| self.max_file_size_mb.saturating_mul(MB))
    }

    /// Per-folder limit in bytes, if any.
    pub fn max_folder_size(&self) -> Option<u64> {
        (self.max_folder_size_mb > 0).then(|| self.max_folder_size_mb.saturating_mul(MB))
    }

    /// Check the invariant that non-empty read and write hashes differ.
    pub fn validate(&self) -> Result<()> {
        if !self.read_password_hash.is_empty()
            && self.read_password_hash == self.write_password_hash
        {
            return Err(StoreError::PasswordsMustDiffer);
        }
        Ok(())
    }

    /// Load the config owned by `dir`, or `None` if the folder has none.
    pub async fn load(dir: &Path) -> Result<Option<Self>> {
        match fs::read(dir.join(CONFIG_FILE_NAME)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the config into `dir`, replacing any previous one atomically.
    pub async fn save(&self, dir: &Path) -> Result<()> {
        self.validate()?;
        let bytes = serde_json::to_vec_pretty(self)?;
        let tmp = dir.join(format!(".config.{}.tmp", Uuid::new_v4().simple()));
        fs::write(&tmp, &bytes).await?;
        if let Err(e) = fs::rename(&tmp, dir.join(CONFIG_FILE_NAME)).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

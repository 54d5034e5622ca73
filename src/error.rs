//! Error types for folderkeep.
//!
//! Every fallible operation of the store returns [`StoreError`]. Raw OS and
//! cache-backend errors never cross this boundary: filesystem failures are
//! logged and collapsed into [`StoreError::Storage`], cache failures are
//! swallowed by the cache layer itself.

use thiserror::Error;

/// Common error type for folderkeep.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Folder, file or other resource is absent.
    #[error("{0} not found")]
    NotFound(String),

    /// No folder between the requested path and the root defines a config.
    #[error("folder configuration not found")]
    ConfigNotFound,

    /// Read access to the folder requires a password.
    #[error("read access denied")]
    NoReadAccess {
        /// Folder that needs a password.
        folder: String,
    },

    /// Write access to the folder requires a password.
    #[error("write access denied")]
    NoWriteAccess {
        /// Folder that needs a password.
        folder: String,
    },

    /// The submitted password does not match.
    #[error("wrong password")]
    WrongPassword,

    /// The new write password is too easy to guess.
    #[error("password is too weak")]
    PasswordTooWeak,

    /// Read and write passwords would be identical.
    #[error("read and write passwords must differ")]
    PasswordsMustDiffer,

    /// Passwords can only be changed on the folder owning the config.
    #[error("folder inherits its configuration and cannot change it")]
    InheritedConfigImmutable,

    /// A file or folder with that name already exists.
    #[error("file already exists")]
    FileAlreadyExists,

    /// Per-file or per-folder size limit exceeded.
    #[error("size limit exceeded")]
    SizeLimitExceeded,

    /// Another operation holds the folder's lock. Retry later.
    #[error("resource busy, try again")]
    ResourceBusy,

    /// A subfolder still holds files or subfolders.
    #[error("folder is not empty")]
    FolderNotEmpty,

    /// The folder's config forbids creating subfolders.
    #[error("subfolders are disabled")]
    SubfoldersDisabled,

    /// Rename/move target is not acceptable.
    #[error("invalid move target")]
    InvalidMoveTarget,

    /// Thumbnail or archive format not supported (or generation failed).
    #[error("unsupported format")]
    UnsupportedFormat,

    /// Path escapes the root or contains forbidden components.
    #[error("invalid path")]
    InvalidPath,

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Fetching a remote file failed.
    #[error("download failed: {0}")]
    Download(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Opaque storage failure. Details are only logged.
    #[error("storage error")]
    Storage,
}

impl StoreError {
    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::ResourceBusy)
    }

    /// Folder that needs a password, for redirect-to-auth handling.
    pub fn auth_folder(&self) -> Option<&str> {
        match self {
            StoreError::NoReadAccess { folder } | StoreError::NoWriteAccess { folder } => {
                Some(folder)
            }
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            return StoreError::NotFound("file".to_string());
        }
        tracing::error!(error = %e, "storage I/O failure");
        StoreError::Storage
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        tracing::error!(error = %e, "corrupt metadata record");
        StoreError::Storage
    }
}

/// Result type alias for folderkeep operations.
pub type Result<T> = std::result::Result<T, StoreError>;

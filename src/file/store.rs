//! Content-addressed file storage.
//!
//! Every file is a pair of artifacts inside its folder:
//! ```text
//! {folder}/
//! ├── 0f5c...e1.json   metadata
//! └── 0f5c...e1.bin    content
//! ```
//! Both exist or neither does. Creating and moving write the metadata
//! first and roll it back on failure; deleting removes the metadata first.
//! Content is staged in a temporary file under the storage root and renamed
//! into place, so a reader never sees a half-written blob.

use std::fmt;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::metadata::{derive_storage_key, File, ThumbnailRecord};
use super::mime::{MimeDetector, SniffingDetector, SNIFF_LEN};
use crate::folder::{path, Folder};
use crate::{Result, StoreError};

/// Copy buffer size for staging content.
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Restores the metadata slot unless disarmed.
///
/// Runs on error returns, on cancellation (the owning future is dropped)
/// and on panics.
struct MetadataRollback {
    path: PathBuf,
    previous: Option<Vec<u8>>,
    armed: bool,
}

impl MetadataRollback {
    fn new(path: PathBuf, previous: Option<Vec<u8>>) -> Self {
        Self {
            path,
            previous,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for MetadataRollback {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let result = match &self.previous {
            Some(bytes) => std::fs::write(&self.path, bytes),
            None => std::fs::remove_file(&self.path),
        };
        match result {
            Ok(()) => warn!(path = %self.path.display(), "metadata rolled back"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => error!(error = %e, path = %self.path.display(), "metadata rollback failed"),
        }
    }
}

/// Create a metadata file, failing if the slot is taken.
async fn write_metadata_new(path: &Path, file: &File) -> Result<MetadataRollback> {
    let bytes = serde_json::to_vec_pretty(file)?;

    let mut out = match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
    {
        Ok(out) => out,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(StoreError::FileAlreadyExists)
        }
        Err(e) => return Err(e.into()),
    };

    let guard = MetadataRollback::new(path.to_path_buf(), None);
    out.write_all(&bytes).await?;
    out.flush().await?;
    Ok(guard)
}

/// Replace a metadata file atomically.
async fn replace_metadata(path: &Path, file: &File) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(file)?;
    let dir = path.parent().unwrap_or(Path::new("."));
    let tmp = dir.join(format!(".meta-{}.tmp", Uuid::new_v4().simple()));

    fs::write(&tmp, &bytes).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

async fn is_dir(dir: &Path) -> bool {
    fs::metadata(dir).await.map(|m| m.is_dir()).unwrap_or(false)
}

async fn exists(path: &Path) -> bool {
    fs::metadata(path).await.is_ok()
}

/// Read the metadata of every complete file in `dir`, sorted by name.
///
/// Records without a blob (a create or move in flight, or interrupted) and
/// undecodable records are skipped.
pub async fn read_listing(dir: &Path, rel_path: &str) -> Result<Vec<File>> {
    let mut files = Vec::new();
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(stem) = name.strip_suffix(".json") else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        if !exists(&dir.join(format!("{stem}.bin"))).await {
            debug!(entry = %name, "skipping metadata without blob");
            continue;
        }

        let bytes = match fs::read(entry.path()).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice::<File>(&bytes) {
            Ok(mut file) => {
                file.folder = rel_path.to_string();
                files.push(file);
            }
            Err(e) => warn!(error = %e, entry = %name, "skipping undecodable metadata"),
        }
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// File storage service rooted at the storage root.
#[derive(Clone)]
pub struct FileStore {
    root: PathBuf,
    detector: Arc<dyn MimeDetector>,
}

impl fmt::Debug for FileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStore").field("root", &self.root).finish()
    }
}

impl FileStore {
    /// Create a store over `root` with the default MIME detector.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            detector: Arc::new(SniffingDetector),
        }
    }

    /// Use a different MIME detector.
    pub fn with_detector(mut self, detector: Arc<dyn MimeDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// Storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn folder_dir(&self, folder: &str) -> PathBuf {
        path::to_fs_path(&self.root, folder)
    }

    /// Absolute path of a file's metadata artifact.
    pub fn metadata_path(&self, file: &File) -> PathBuf {
        self.folder_dir(&file.folder).join(file.metadata_file_name())
    }

    /// Absolute path of a file's content artifact.
    pub fn blob_path(&self, file: &File) -> PathBuf {
        self.folder_dir(&file.folder).join(file.blob_file_name())
    }

    /// Load a file by folder and display name.
    pub async fn get(&self, folder: &str, name: &str) -> Result<File> {
        let key = derive_storage_key(folder, name);
        let dir = self.folder_dir(folder);

        let bytes = match fs::read(dir.join(format!("{key}.json"))).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound("file".to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if !exists(&dir.join(format!("{key}.bin"))).await {
            return Err(StoreError::NotFound("file".to_string()));
        }

        let mut file: File = serde_json::from_slice(&bytes)?;
        file.folder = folder.to_string();
        Ok(file)
    }

    /// Store a new file.
    ///
    /// See [`FileStore::create_limited`].
    pub async fn create<R>(&self, file: &mut File, content: R, overwrite: bool) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        self.create_limited(file, content, overwrite, None).await
    }

    /// Store a new file, rejecting content larger than `limit` bytes.
    ///
    /// The metadata slot is claimed first; without `overwrite` an occupied
    /// slot fails with [`StoreError::FileAlreadyExists`] before anything
    /// else is written. An empty `mime` is detected from the first bytes of
    /// `content`, and `size` is always set to the number of bytes stored.
    pub async fn create_limited<R>(
        &self,
        file: &mut File,
        mut content: R,
        overwrite: bool,
        limit: Option<u64>,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        path::validate_name(&file.name)?;
        file.storage_key = derive_storage_key(&file.folder, &file.name);

        if !is_dir(&self.folder_dir(&file.folder)).await {
            return Err(StoreError::NotFound("folder".to_string()));
        }

        let meta_path = self.metadata_path(file);
        let guard = if overwrite {
            let previous = match fs::read(&meta_path).await {
                Ok(bytes) => Some(bytes),
                Err(e) if e.kind() == ErrorKind::NotFound => None,
                Err(e) => return Err(e.into()),
            };
            let guard = MetadataRollback::new(meta_path.clone(), previous);
            replace_metadata(&meta_path, file).await?;
            guard
        } else {
            write_metadata_new(&meta_path, file).await?
        };

        let (staged, written, head) = self.stage_content(&mut content, limit).await?;

        let detected = file.mime.is_empty();
        if detected {
            file.mime = self.detector.detect(&head, &file.name);
        }
        if detected || file.size != written {
            file.size = written;
            replace_metadata(&meta_path, file).await?;
        }

        staged
            .persist(self.blob_path(file))
            .map_err(|e| StoreError::from(e.error))?;
        guard.disarm();

        info!(
            file = %file.lower_path(),
            key = %file.storage_key,
            size = file.size,
            mime = %file.mime,
            "file stored"
        );
        Ok(())
    }

    /// Stream `content` into a temporary file under the root.
    ///
    /// Returns the temporary file, the byte count and the first bytes for
    /// MIME detection. The temporary file is removed when dropped.
    async fn stage_content<R>(
        &self,
        content: &mut R,
        limit: Option<u64>,
    ) -> Result<(NamedTempFile, u64, Vec<u8>)>
    where
        R: AsyncRead + Unpin,
    {
        let staged = tempfile::Builder::new()
            .prefix(".upload-")
            .suffix(".tmp")
            .tempfile_in(&self.root)?;
        let mut out = fs::File::from_std(staged.as_file().try_clone()?);

        let mut head = Vec::with_capacity(SNIFF_LEN);
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut written: u64 = 0;

        loop {
            let n = content.read(&mut buf).await.map_err(|e| {
                warn!(error = %e, "reading file content failed");
                StoreError::Storage
            })?;
            if n == 0 {
                break;
            }

            written += n as u64;
            if limit.is_some_and(|max| written > max) {
                return Err(StoreError::SizeLimitExceeded);
            }
            if head.len() < SNIFF_LEN {
                let take = (SNIFF_LEN - head.len()).min(n);
                head.extend_from_slice(&buf[..take]);
            }
            out.write_all(&buf[..n]).await?;
        }

        out.flush().await?;
        out.sync_all().await?;
        Ok((staged, written, head))
    }

    /// Rewrite the metadata of an existing file (tags, visibility).
    ///
    /// Callers hold the folder's resource lock. Unlocked writers go through
    /// [`FileStore::set_thumbnail`].
    pub async fn update_metadata(&self, file: &File) -> Result<()> {
        let meta_path = self.metadata_path(file);
        if !exists(&meta_path).await {
            return Err(StoreError::NotFound("file".to_string()));
        }
        replace_metadata(&meta_path, file).await
    }

    /// Attach a thumbnail to the stored record of `file`, leaving every
    /// other field as currently stored.
    ///
    /// The record is patched in place through a handle opened without
    /// create, so a file deleted or replaced in the meantime is never
    /// brought back. Returns `false` when the stored record no longer
    /// describes the same content as `file`.
    pub async fn set_thumbnail(&self, file: &File, thumbnail: &ThumbnailRecord) -> Result<bool> {
        let meta_path = self.metadata_path(file);
        let mut handle = match fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&meta_path)
            .await
        {
            Ok(handle) => handle,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound("file".to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let mut bytes = Vec::new();
        handle.read_to_end(&mut bytes).await?;
        let mut current: File = serde_json::from_slice(&bytes)?;
        if current.storage_key != file.storage_key
            || current.size != file.size
            || current.uploaded_at != file.uploaded_at
        {
            debug!(file = %file.lower_path(), "stored record changed, thumbnail dropped");
            return Ok(false);
        }

        current.thumbnail = Some(thumbnail.clone());
        let bytes = serde_json::to_vec_pretty(&current)?;
        handle.seek(SeekFrom::Start(0)).await?;
        handle.write_all(&bytes).await?;
        handle.set_len(bytes.len() as u64).await?;
        handle.flush().await?;
        Ok(true)
    }

    /// Rename and/or move a file.
    ///
    /// The new metadata is written before the blob moves and the old
    /// metadata is removed last, so an interruption leaves the file at its
    /// new location. If the blob cannot be moved the new metadata is rolled
    /// back and `file` keeps its old name and key.
    pub async fn move_to(&self, file: &mut File, new_folder: &str, new_name: &str) -> Result<()> {
        path::validate_name(new_name).map_err(|_| StoreError::InvalidMoveTarget)?;
        let new_folder = path::normalize(new_folder).map_err(|_| StoreError::InvalidMoveTarget)?;
        let new_key = derive_storage_key(&new_folder, new_name);

        if new_key == file.storage_key {
            return Ok(());
        }
        if !is_dir(&self.folder_dir(&new_folder)).await {
            return Err(StoreError::InvalidMoveTarget);
        }

        let old_meta = self.metadata_path(file);
        let old_blob = self.blob_path(file);
        let old = (file.folder.clone(), file.name.clone(), file.storage_key);

        file.folder = new_folder;
        file.name = new_name.to_string();
        file.storage_key = new_key;

        let restore = |file: &mut File| {
            file.folder = old.0.clone();
            file.name = old.1.clone();
            file.storage_key = old.2;
        };

        let guard = match write_metadata_new(&self.metadata_path(file), file).await {
            Ok(guard) => guard,
            Err(e) => {
                restore(file);
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&old_blob, self.blob_path(file)).await {
            drop(guard);
            restore(file);
            warn!(error = %e, file = %file.lower_path(), "blob move failed");
            return Err(e.into());
        }
        guard.disarm();

        match fs::remove_file(&old_meta).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                error!(error = %e, key = %old.2, "stale metadata left behind after move");
                return Err(StoreError::Storage);
            }
        }

        info!(
            from = %path::join(&old.0, &old.1),
            to = %file.lower_path(),
            "file moved"
        );
        Ok(())
    }

    /// Delete a file: metadata first, then the blob.
    ///
    /// Once the metadata is gone the file no longer exists for readers. A
    /// blob that cannot be removed is reported as [`StoreError::Storage`]
    /// and left as an invisible orphan.
    pub async fn delete(&self, file: &File) -> Result<()> {
        match fs::remove_file(self.metadata_path(file)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound("file".to_string()))
            }
            Err(e) => return Err(e.into()),
        }

        match fs::remove_file(self.blob_path(file)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                error!(error = %e, key = %file.storage_key, "blob removal failed");
                return Err(StoreError::Storage);
            }
        }

        info!(file = %file.lower_path(), "file deleted");
        Ok(())
    }

    /// Files of `folder` carrying `tag`, in listing order.
    pub async fn search(&self, folder: &Folder, tag: &str) -> Result<Vec<File>> {
        let files = match &folder.cached_files {
            Some(files) => files.clone(),
            None => read_listing(&folder.dir(), &folder.rel_path).await?,
        };
        Ok(files.into_iter().filter(|f| f.has_tag(tag)).collect())
    }
}

//! Folder store service.
//!
//! [`Store`] is the entry point for outer layers (HTTP handlers, CLIs).
//! Every operation follows the same flow:
//!
//! 1. resolve the folder (cache first, then the filesystem),
//! 2. take the config root's lock if mutating,
//! 3. authorize the caller's capability token,
//! 4. run the file store operation,
//! 5. refresh the affected cache entries, and release the lock.
//!
//! Authorization failures look the same for missing folders and wrong
//! passwords: a folder that does not exist is only reported as missing to
//! callers who could access it if it did.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{
    authorize, issue_token, set_password, test_password, CapabilityToken, HeuristicEstimator,
    StrengthEstimator,
};
use crate::cache::{FolderCache, MemoryCache};
use crate::config::Config;
use crate::download::Downloader;
use crate::file::mime::OCTET_STREAM;
use crate::file::{read_listing, File, FileStore, MimeDetector, ThumbnailRecord};
use crate::folder::{
    find_config_root, list_subfolders, path, resolve, resource_id, AccessKind, Folder,
    FolderConfig,
};
use crate::lock::ResourceLock;
use crate::thumbnail::{ThumbnailCache, ThumbnailGenerator};
use crate::{Result, StoreError};

/// Default minimum strength score for write passwords.
pub const DEFAULT_MIN_WRITE_SCORE: u8 = 3;

/// Default maximum thumbnail width.
pub const DEFAULT_THUMBNAIL_WIDTH: u32 = 320;

/// Default backoff after a failed thumbnail generation.
pub const DEFAULT_THUMBNAIL_RETRY: Duration = Duration::from_secs(24 * 60 * 60);

/// Request data for a file upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Display name of the new file.
    pub name: String,
    /// Tags to attach.
    pub tags: Vec<String>,
    /// Content type; detected from the content when absent.
    pub mime: Option<String>,
    /// Readable without the folder's read password.
    pub public: bool,
    /// Replace an existing file of the same name.
    pub overwrite: bool,
}

impl UploadRequest {
    /// Create a new upload request.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
            mime: None,
            public: false,
            overwrite: false,
        }
    }

    /// Set the tags.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Set the content type.
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    /// Mark the file public.
    pub fn with_public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    /// Allow replacing an existing file.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// Changes to apply to a stored file. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct FileEdit {
    /// Replacement tag set.
    pub tags: Option<Vec<String>>,
    /// New visibility.
    pub public: Option<bool>,
    /// New display name.
    pub new_name: Option<String>,
    /// New containing folder, under the same config root.
    pub new_folder: Option<String>,
}

/// A readable folder listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    /// Normalized folder path.
    pub path: String,
    /// Folder owning the effective config.
    pub config_root_path: String,
    /// Whether subfolders may be created here.
    pub subfolders_allowed: bool,
    /// Files, sorted by name.
    pub files: Vec<File>,
    /// Subfolder names, sorted.
    pub subfolders: Vec<String>,
}

/// A file opened for reading.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenedFile {
    /// File metadata.
    pub file: File,
    /// Absolute path of the content blob.
    pub path: PathBuf,
}

/// The folder store.
#[derive(Clone)]
pub struct Store {
    root: PathBuf,
    cache: FolderCache,
    locks: ResourceLock,
    files: FileStore,
    thumbnails: ThumbnailCache,
    estimator: Arc<dyn StrengthEstimator>,
    downloader: Option<Downloader>,
    min_write_score: u8,
    thumbnail_width: u32,
    thumbnail_retry: Duration,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("root", &self.root)
            .field("cache", &self.cache)
            .field("min_write_score", &self.min_write_score)
            .finish()
    }
}

async fn is_dir(dir: &Path) -> bool {
    fs::metadata(dir).await.map(|m| m.is_dir()).unwrap_or(false)
}

impl Store {
    /// Create a store over `root` with no cache and no downloader.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let files = FileStore::new(&root);
        Self {
            thumbnails: ThumbnailCache::new(files.clone()),
            files,
            root,
            cache: FolderCache::disabled(),
            locks: ResourceLock::new(),
            estimator: Arc::new(HeuristicEstimator),
            downloader: None,
            min_write_score: DEFAULT_MIN_WRITE_SCORE,
            thumbnail_width: DEFAULT_THUMBNAIL_WIDTH,
            thumbnail_retry: DEFAULT_THUMBNAIL_RETRY,
        }
    }

    /// Create a store from configuration.
    ///
    /// Uses the in-process [`MemoryCache`] when the cache is enabled.
    pub fn from_config(config: &Config) -> Result<Self> {
        let cache = if config.cache.enabled {
            FolderCache::new(Arc::new(MemoryCache::new()), config.cache.ttl())
        } else {
            FolderCache::disabled()
        };

        Ok(Self::new(&config.storage.root)
            .with_cache(cache)
            .with_downloader(Downloader::new(&config.download)?)
            .with_min_write_score(config.passwords.min_write_score)
            .with_thumbnail_settings(
                config.thumbnails.max_width,
                config.thumbnails.retry_after(),
            ))
    }

    /// Use a folder cache.
    pub fn with_cache(mut self, cache: FolderCache) -> Self {
        self.cache = cache;
        self
    }

    /// Use a password strength estimator.
    pub fn with_estimator(mut self, estimator: Arc<dyn StrengthEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Use a MIME detector.
    pub fn with_detector(mut self, detector: Arc<dyn MimeDetector>) -> Self {
        self.files = self.files.with_detector(detector);
        self.thumbnails = ThumbnailCache::new(self.files.clone());
        self
    }

    /// Enable download-to-folder.
    pub fn with_downloader(mut self, downloader: Downloader) -> Self {
        self.downloader = Some(downloader);
        self
    }

    /// Set the minimum write password score.
    pub fn with_min_write_score(mut self, score: u8) -> Self {
        self.min_write_score = score;
        self
    }

    /// Set the thumbnail width and failure backoff.
    pub fn with_thumbnail_settings(mut self, max_width: u32, retry_after: Duration) -> Self {
        self.thumbnail_width = max_width;
        self.thumbnail_retry = retry_after;
        self
    }

    /// Storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The lock table shared by all clones of this store.
    pub fn locks(&self) -> &ResourceLock {
        &self.locks
    }

    // ---------------------------------------------------------------------
    // Provisioning
    // ---------------------------------------------------------------------

    /// Give `rel_path` its own config, creating the folder if needed.
    ///
    /// Operator path: no token and no strength check. Fails with
    /// [`StoreError::FileAlreadyExists`] if the folder already owns one.
    pub async fn init_folder(&self, rel_path: &str, config: FolderConfig) -> Result<Folder> {
        let rel = path::normalize(rel_path)?;
        let dir = path::to_fs_path(&self.root, &rel);

        fs::create_dir_all(&dir).await?;
        if FolderConfig::load(&dir).await?.is_some() {
            return Err(StoreError::FileAlreadyExists);
        }

        let previous_root = match find_config_root(&self.root, &rel).await {
            Ok((previous_root, _)) => Some(previous_root),
            Err(StoreError::ConfigNotFound) => None,
            Err(e) => return Err(e),
        };

        config.save(&dir).await?;

        // Folders below that inherited from the previous root now inherit
        // from this one.
        if let Some(previous_root) = previous_root {
            self.cache.invalidate_config(&previous_root);
        }
        self.cache.invalidate_config(&rel);

        let folder = resolve(&self.root, &rel).await?;
        self.refresh_cache(&folder).await;

        info!(folder = %rel, public = config.is_public(), "folder config provisioned");
        Ok(folder)
    }

    /// Provision the root config.
    pub async fn init_root(&self, config: FolderConfig) -> Result<Folder> {
        self.init_folder("", config).await
    }

    /// Provision a public root config unless one exists. Returns whether a
    /// config was written.
    pub async fn ensure_root(&self) -> Result<bool> {
        fs::create_dir_all(&self.root).await?;
        if FolderConfig::load(&self.root).await?.is_some() {
            return Ok(false);
        }
        match self.init_root(FolderConfig::public()).await {
            Ok(_) => Ok(true),
            Err(StoreError::FileAlreadyExists) => Ok(false),
            Err(e) => Err(e),
        }
    }

    // ---------------------------------------------------------------------
    // Resolution and authorization
    // ---------------------------------------------------------------------

    /// Resolve a folder with materialized listings.
    ///
    /// Served from the cache when possible; a miss is resolved from the
    /// filesystem and written back to the cache in the background.
    pub async fn open_folder(&self, rel_path: &str, cancel: &CancellationToken) -> Result<Folder> {
        let rel = path::normalize(rel_path)?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StoreError::Cancelled),
            result = self.load_folder(&rel, true) => result,
        }
    }

    async fn load_folder(&self, rel: &str, populate: bool) -> Result<Folder> {
        if let Some(folder) = self.cache.get(rel) {
            if is_dir(&folder.dir()).await {
                return Ok(folder);
            }
            self.cache.invalidate(rel);
        }

        let mut folder = resolve(&self.root, rel).await?;
        folder.materialize().await?;

        // Mutations skip this and write a fresh entry themselves.
        if populate && self.cache.is_enabled() {
            let cache = self.cache.clone();
            let entry = folder.clone();
            tokio::spawn(async move {
                cache.put(&entry).await;
            });
        }

        Ok(folder)
    }

    /// Load a folder and check `kind` access to it.
    async fn open_authorized(
        &self,
        rel: &str,
        kind: AccessKind,
        token: &CapabilityToken,
        populate: bool,
    ) -> Result<Folder> {
        match self.load_folder(rel, populate).await {
            Ok(folder) => {
                authorize(&folder, kind, token)?;
                Ok(folder)
            }
            Err(StoreError::NotFound(what)) => {
                self.authorize_missing(rel, kind, token).await?;
                Err(StoreError::NotFound(what))
            }
            Err(e) => Err(e),
        }
    }

    /// Authorize against the config a missing folder would inherit.
    async fn authorize_missing(
        &self,
        rel: &str,
        kind: AccessKind,
        token: &CapabilityToken,
    ) -> Result<()> {
        let (config_root_path, config) = find_config_root(&self.root, rel).await?;
        let would_be = Folder {
            root: self.root.clone(),
            rel_path: rel.to_string(),
            config_inherited: config_root_path != rel,
            config,
            config_root_path,
            cached_files: None,
            cached_subfolders: None,
        };
        authorize(&would_be, kind, token)
    }

    /// Replace the cache entry of a just-mutated folder.
    ///
    /// Called while the lock is still held so populators that read the
    /// folder before the mutation cannot win.
    async fn refresh_cache(&self, folder: &Folder) {
        if !self.cache.is_enabled() {
            return;
        }
        let mut fresh = folder.clone();
        fresh.cached_files = None;
        fresh.cached_subfolders = None;
        self.cache.put_force(&fresh).await;
    }

    /// Exchange a password for a capability token.
    ///
    /// The token is scoped to the folder's config root, so it also opens
    /// every folder inheriting that config. A public folder accepts the
    /// empty read password; a folder without a write password accepts no
    /// write password at all.
    pub async fn authenticate(
        &self,
        rel_path: &str,
        kind: AccessKind,
        password: &str,
    ) -> Result<CapabilityToken> {
        let rel = path::normalize(rel_path)?;
        let (config_root_path, config) = find_config_root(&self.root, &rel).await?;

        if !test_password(&config, kind, password) {
            warn!(folder = %rel, kind = kind.as_str(), "wrong password");
            return Err(StoreError::WrongPassword);
        }

        debug!(folder = %rel, config_root = %config_root_path, kind = kind.as_str(), "token issued");
        Ok(issue_token(&config, resource_id(&config_root_path), kind))
    }

    // ---------------------------------------------------------------------
    // Reading
    // ---------------------------------------------------------------------

    /// List a folder. Needs read access even for public files.
    pub async fn list(
        &self,
        rel_path: &str,
        token: &CapabilityToken,
        cancel: &CancellationToken,
    ) -> Result<Listing> {
        let rel = path::normalize(rel_path)?;
        let folder = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StoreError::Cancelled),
            result = self.open_authorized(&rel, AccessKind::Read, token, true) => result?,
        };

        Ok(Listing {
            subfolders_allowed: folder.config.subfolders_allowed,
            files: folder.cached_files.unwrap_or_default(),
            subfolders: folder.cached_subfolders.unwrap_or_default(),
            path: folder.rel_path,
            config_root_path: folder.config_root_path,
        })
    }

    /// Load a file for reading. Public files need no read access.
    async fn open_readable(&self, rel: &str, name: &str, token: &CapabilityToken) -> Result<File> {
        let folder = match self.load_folder(rel, true).await {
            Ok(folder) => folder,
            Err(StoreError::NotFound(what)) => {
                self.authorize_missing(rel, AccessKind::Read, token).await?;
                return Err(StoreError::NotFound(what));
            }
            Err(e) => return Err(e),
        };

        match self.files.get(&folder.rel_path, name).await {
            Ok(file) if file.public => Ok(file),
            Ok(file) => {
                authorize(&folder, AccessKind::Read, token)?;
                Ok(file)
            }
            Err(e) => {
                authorize(&folder, AccessKind::Read, token)?;
                Err(e)
            }
        }
    }

    /// Open a file: its metadata and the path of its content.
    pub async fn open_file(
        &self,
        rel_path: &str,
        name: &str,
        token: &CapabilityToken,
    ) -> Result<OpenedFile> {
        let rel = path::normalize(rel_path)?;
        let file = self.open_readable(&rel, name, token).await?;
        Ok(OpenedFile {
            path: self.files.blob_path(&file),
            file,
        })
    }

    /// Files of a folder carrying `tag`.
    pub async fn search(
        &self,
        rel_path: &str,
        token: &CapabilityToken,
        tag: &str,
    ) -> Result<Vec<File>> {
        let rel = path::normalize(rel_path)?;
        let folder = self.open_authorized(&rel, AccessKind::Read, token, true).await?;
        self.files.search(&folder, tag).await
    }

    /// Thumbnail of a file, generated on first request.
    ///
    /// Takes no lock. Cancelling drops the generation without persisting
    /// anything.
    pub async fn thumbnail<G>(
        &self,
        rel_path: &str,
        token: &CapabilityToken,
        name: &str,
        generator: &G,
        cancel: &CancellationToken,
    ) -> Result<ThumbnailRecord>
    where
        G: ThumbnailGenerator,
    {
        let rel = path::normalize(rel_path)?;
        let work = async {
            let mut file = self.open_readable(&rel, name, token).await?;
            self.thumbnails
                .get_or_generate(
                    &mut file,
                    self.thumbnail_width,
                    self.thumbnail_retry,
                    generator,
                )
                .await
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StoreError::Cancelled),
            result = work => result,
        }
    }

    // ---------------------------------------------------------------------
    // Writing
    // ---------------------------------------------------------------------

    /// Upload a file into a folder.
    ///
    /// Content beyond the per-file limit or the folder's remaining quota
    /// fails with [`StoreError::SizeLimitExceeded`] and leaves nothing
    /// behind. Cancelling also cleans up.
    pub async fn upload<R>(
        &self,
        rel_path: &str,
        token: &CapabilityToken,
        request: UploadRequest,
        content: R,
        cancel: &CancellationToken,
    ) -> Result<File>
    where
        R: AsyncRead + Unpin,
    {
        let rel = path::normalize(rel_path)?;
        let folder = self
            .open_authorized(&rel, AccessKind::Write, token, false)
            .await?;
        self.store_content(&folder, request, content, cancel).await
    }

    /// Fetch a remote file into a folder.
    ///
    /// The name defaults to the last segment of the URL path. Cancelling
    /// stops reading the response and removes the partial file.
    pub async fn download_to_folder(
        &self,
        rel_path: &str,
        token: &CapabilityToken,
        url: &str,
        name: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<File> {
        let downloader = self
            .downloader
            .as_ref()
            .ok_or_else(|| StoreError::Download("downloads are disabled".to_string()))?;

        let rel = path::normalize(rel_path)?;
        let folder = self
            .open_authorized(&rel, AccessKind::Write, token, false)
            .await?;

        let remote = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StoreError::Cancelled),
            result = downloader.fetch(url) => result?,
        };

        if let (Some(limit), Some(length)) = (folder.config.max_file_size(), remote.content_length) {
            if length > limit {
                return Err(StoreError::SizeLimitExceeded);
            }
        }

        let name = name
            .map(str::to_string)
            .or_else(|| remote.name_hint.clone())
            .ok_or(StoreError::InvalidPath)?;

        let mut request = UploadRequest::new(name);
        // A generic type tells nothing; sniff instead.
        request.mime = remote.mime.clone().filter(|m| m != OCTET_STREAM);

        info!(folder = %folder.rel_path, url = %remote.url, "downloading into folder");
        self.store_content(&folder, request, remote.body, cancel).await
    }

    async fn store_content<R>(
        &self,
        folder: &Folder,
        request: UploadRequest,
        content: R,
        cancel: &CancellationToken,
    ) -> Result<File>
    where
        R: AsyncRead + Unpin,
    {
        path::validate_name(&request.name)?;
        let _guard = self.locks.acquire(&folder.config_root_path)?;

        let mut file = File::new(folder.rel_path.clone(), request.name)
            .with_tags(request.tags)
            .with_public(request.public);
        if let Some(mime) = request.mime {
            file.mime = mime;
        }

        let limit = self.upload_limit(folder, &file).await?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(file = %file.lower_path(), "upload cancelled");
                return Err(StoreError::Cancelled);
            }
            result = self.files.create_limited(&mut file, content, request.overwrite, limit) => result?,
        }

        self.refresh_cache(folder).await;
        info!(file = %file.lower_path(), size = file.size, "upload stored");
        Ok(file)
    }

    /// Bytes a new version of `file` may occupy.
    async fn upload_limit(&self, folder: &Folder, file: &File) -> Result<Option<u64>> {
        let per_file = folder.config.max_file_size();
        let Some(max_folder) = folder.config.max_folder_size() else {
            return Ok(per_file);
        };

        // A replaced file frees its own space.
        let used: u64 = read_listing(&folder.dir(), &folder.rel_path)
            .await?
            .iter()
            .filter(|f| f.storage_key != file.storage_key)
            .map(|f| f.size)
            .sum();
        let remaining = max_folder.saturating_sub(used);

        Ok(Some(per_file.map_or(remaining, |max| max.min(remaining))))
    }

    /// Edit a file's tags or visibility, or rename/move it.
    ///
    /// Moves stay under the folder's config root; any other target fails
    /// with [`StoreError::InvalidMoveTarget`].
    pub async fn edit(
        &self,
        rel_path: &str,
        token: &CapabilityToken,
        name: &str,
        edit: FileEdit,
    ) -> Result<File> {
        let rel = path::normalize(rel_path)?;
        let folder = self
            .open_authorized(&rel, AccessKind::Write, token, false)
            .await?;
        let _guard = self.locks.acquire(&folder.config_root_path)?;

        let mut file = self.files.get(&folder.rel_path, name).await?;
        if let Some(tags) = edit.tags {
            file.set_tags(tags);
        }
        if let Some(public) = edit.public {
            file.public = public;
        }

        let target_folder = match edit.new_folder {
            Some(target) => path::normalize(&target).map_err(|_| StoreError::InvalidMoveTarget)?,
            None => folder.rel_path.clone(),
        };
        let target_name = edit.new_name.unwrap_or_else(|| file.name.clone());

        if target_folder == folder.rel_path && target_name == file.name {
            self.files.update_metadata(&file).await?;
        } else if target_folder == folder.rel_path {
            self.files
                .move_to(&mut file, &target_folder, &target_name)
                .await?;
        } else {
            let target = self.move_target(&folder, &target_folder).await?;
            self.files
                .move_to(&mut file, &target_folder, &target_name)
                .await?;
            self.refresh_cache(&target).await;
        }

        self.refresh_cache(&folder).await;
        info!(file = %file.lower_path(), "file edited");
        Ok(file)
    }

    /// Resolve a move target folder under the same config root.
    async fn move_target(&self, folder: &Folder, target: &str) -> Result<Folder> {
        let target = match resolve(&self.root, target).await {
            Ok(target) => target,
            Err(StoreError::NotFound(_)) => return Err(StoreError::InvalidMoveTarget),
            Err(e) => return Err(e),
        };
        if target.config_root_path != folder.config_root_path {
            return Err(StoreError::InvalidMoveTarget);
        }
        Ok(target)
    }

    /// Delete a file.
    pub async fn delete(&self, rel_path: &str, token: &CapabilityToken, name: &str) -> Result<()> {
        let rel = path::normalize(rel_path)?;
        let folder = self
            .open_authorized(&rel, AccessKind::Write, token, false)
            .await?;
        let _guard = self.locks.acquire(&folder.config_root_path)?;

        let file = self.files.get(&folder.rel_path, name).await?;
        let result = self.files.delete(&file).await;

        // The metadata may be gone even if the blob removal failed.
        self.refresh_cache(&folder).await;
        result
    }

    /// Change the read or write password of a config-owning folder.
    ///
    /// Needs write access. Tokens for the changed kind stop working from
    /// the next request on.
    pub async fn change_password(
        &self,
        rel_path: &str,
        token: &CapabilityToken,
        kind: AccessKind,
        new_password: &str,
    ) -> Result<()> {
        let rel = path::normalize(rel_path)?;
        let folder = self
            .open_authorized(&rel, AccessKind::Write, token, false)
            .await?;
        let _guard = self.locks.acquire(&folder.config_root_path)?;

        // Re-read under the lock; the cached config may predate a change
        // that finished just before.
        let mut folder = resolve(&self.root, &folder.rel_path).await?;
        authorize(&folder, AccessKind::Write, token)?;

        set_password(
            &mut folder,
            kind,
            new_password,
            self.estimator.as_ref(),
            self.min_write_score,
        )?;
        folder.config.save(&folder.dir()).await?;
        self.cache.invalidate_config(&folder.config_root_path);
        self.refresh_cache(&folder).await;

        info!(folder = %folder.rel_path, kind = kind.as_str(), "password changed");
        Ok(())
    }

    /// Create a subfolder. It inherits the parent's config.
    pub async fn create_subfolder(
        &self,
        rel_path: &str,
        token: &CapabilityToken,
        name: &str,
    ) -> Result<Folder> {
        let rel = path::normalize(rel_path)?;
        let folder = self
            .open_authorized(&rel, AccessKind::Write, token, false)
            .await?;
        path::validate_name(name)?;
        if !folder.config.subfolders_allowed {
            return Err(StoreError::SubfoldersDisabled);
        }
        let _guard = self.locks.acquire(&folder.config_root_path)?;

        let child = path::join(&folder.rel_path, name);
        match fs::create_dir(path::to_fs_path(&self.root, &child)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StoreError::FileAlreadyExists)
            }
            Err(e) => return Err(e.into()),
        }

        self.refresh_cache(&folder).await;
        info!(folder = %child, "subfolder created");
        resolve(&self.root, &child).await
    }

    /// Delete an empty subfolder.
    ///
    /// A subfolder owning its own config also needs write access to that
    /// config.
    pub async fn delete_subfolder(
        &self,
        rel_path: &str,
        token: &CapabilityToken,
        name: &str,
    ) -> Result<()> {
        let rel = path::normalize(rel_path)?;
        let folder = self
            .open_authorized(&rel, AccessKind::Write, token, false)
            .await?;
        path::validate_name(name)?;
        let _guard = self.locks.acquire(&folder.config_root_path)?;

        let child = resolve(&self.root, &path::join(&folder.rel_path, name)).await?;
        let _child_guard = if child.owns_config() {
            authorize(&child, AccessKind::Write, token)?;
            Some(self.locks.acquire(&child.config_root_path)?)
        } else {
            None
        };

        let dir = child.dir();
        if !read_listing(&dir, &child.rel_path).await?.is_empty()
            || !list_subfolders(&dir).await?.is_empty()
        {
            return Err(StoreError::FolderNotEmpty);
        }

        fs::remove_dir_all(&dir).await?;

        self.cache.invalidate(&child.rel_path);
        if child.owns_config() {
            self.cache.invalidate_config(&child.rel_path);
        }
        self.refresh_cache(&folder).await;
        info!(folder = %child.rel_path, "subfolder deleted");
        Ok(())
    }
}

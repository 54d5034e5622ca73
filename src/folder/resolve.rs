//! Config inheritance lookup.

use std::path::Path;

use tracing::debug;

use super::config::FolderConfig;
use super::path;
use super::Folder;
use crate::{Result, StoreError};

/// Find the closest folder at or above `rel_path` that owns a config.
///
/// `rel_path` must already be normalized. Folders along the walk need not
/// exist; a missing folder simply has no config. Returns the owning path
/// and its config, or [`StoreError::ConfigNotFound`] if not even the root
/// has one.
pub async fn find_config_root(root: &Path, rel_path: &str) -> Result<(String, FolderConfig)> {
    let mut current = rel_path;

    loop {
        if let Some(config) = FolderConfig::load(&path::to_fs_path(root, current)).await? {
            return Ok((current.to_string(), config));
        }
        match path::parent(current) {
            Some(parent) => current = parent,
            None => return Err(StoreError::ConfigNotFound),
        }
    }
}

/// Resolve a folder and its effective config.
///
/// Fails with [`StoreError::NotFound`] if the folder does not exist and
/// with [`StoreError::ConfigNotFound`] if no config is provisioned on the
/// way up to the root. Listings are not materialized.
pub async fn resolve(root: &Path, rel_path: &str) -> Result<Folder> {
    let rel_path = path::normalize(rel_path)?;
    let dir = path::to_fs_path(root, &rel_path);

    match tokio::fs::metadata(&dir).await {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(StoreError::NotFound("folder".to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StoreError::NotFound("folder".to_string()))
        }
        Err(e) => return Err(e.into()),
    }

    let (config_root_path, config) = find_config_root(root, &rel_path).await?;
    debug!(folder = %rel_path, config_root = %config_root_path, "resolved folder");

    Ok(Folder {
        root: root.to_path_buf(),
        config_inherited: config_root_path != rel_path,
        rel_path,
        config,
        config_root_path,
        cached_files: None,
        cached_subfolders: None,
    })
}

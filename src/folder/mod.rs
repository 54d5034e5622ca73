//! Folder tree model for folderkeep.
//!
//! This module provides:
//! - Logical path normalization ([`path`])
//! - The persisted per-folder access policy ([`FolderConfig`])
//! - Config inheritance lookup ([`resolve`])
//! - The resolved [`Folder`] view handed to callers and the cache

pub mod config;
pub mod path;
mod resolve;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::file::{self, File};
use crate::Result;

pub use config::{AccessKind, FolderConfig, CONFIG_FILE_NAME};
pub use resolve::{find_config_root, resolve};

/// Namespace for folder resource ids and file storage keys.
pub const KEY_NAMESPACE: Uuid = Uuid::from_u128(0x3c1e_9a4d_7b52_4f0e_a6d8_2e91_5c07_b3f4);

/// Resource id of a config root, the scope of capability tokens.
pub fn resource_id(config_root_path: &str) -> Uuid {
    Uuid::new_v5(&KEY_NAMESPACE, format!("folder:/{config_root_path}").as_bytes())
}

/// A folder resolved against its effective config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    /// Storage root the folder lives under.
    pub root: PathBuf,
    /// Normalized logical path ("" for the root).
    pub rel_path: String,
    /// Effective access policy.
    pub config: FolderConfig,
    /// True if `config` belongs to an ancestor.
    pub config_inherited: bool,
    /// Path of the folder owning `config`.
    pub config_root_path: String,
    /// Materialized file listing, if loaded.
    #[serde(default)]
    pub cached_files: Option<Vec<File>>,
    /// Materialized subfolder names, if loaded.
    #[serde(default)]
    pub cached_subfolders: Option<Vec<String>>,
}

impl Folder {
    /// Absolute directory of this folder.
    pub fn dir(&self) -> PathBuf {
        path::to_fs_path(&self.root, &self.rel_path)
    }

    /// Absolute directory of the config-owning folder.
    pub fn config_root_dir(&self) -> PathBuf {
        path::to_fs_path(&self.root, &self.config_root_path)
    }

    /// Display name (last path component; empty for the root).
    pub fn name(&self) -> &str {
        path::file_name(&self.rel_path)
    }

    /// Whether this folder owns its config.
    pub fn owns_config(&self) -> bool {
        !self.config_inherited
    }

    /// Resource id that tokens for this folder are scoped to.
    pub fn config_root_id(&self) -> Uuid {
        resource_id(&self.config_root_path)
    }

    /// Path components used as guessable context for password strength.
    pub fn path_words(&self) -> Vec<&str> {
        self.rel_path.split('/').filter(|c| !c.is_empty()).collect()
    }

    /// Whether both listings are materialized.
    pub fn is_materialized(&self) -> bool {
        self.cached_files.is_some() && self.cached_subfolders.is_some()
    }

    /// Read whichever listings are not yet materialized.
    pub async fn materialize(&mut self) -> Result<()> {
        if self.cached_files.is_none() {
            self.cached_files = Some(file::read_listing(&self.dir(), &self.rel_path).await?);
        }
        if self.cached_subfolders.is_none() {
            self.cached_subfolders = Some(list_subfolders(&self.dir()).await?);
        }
        Ok(())
    }

    /// Files of the materialized listing (empty if not loaded).
    pub fn files(&self) -> &[File] {
        self.cached_files.as_deref().unwrap_or(&[])
    }

    /// Subfolders of the materialized listing (empty if not loaded).
    pub fn subfolders(&self) -> &[String] {
        self.cached_subfolders.as_deref().unwrap_or(&[])
    }
}

/// Names of the visible subdirectories of `dir`, sorted.
pub async fn list_subfolders(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if !name.starts_with('.') {
                names.push(name.to_string());
            }
        }
    }

    names.sort();
    Ok(names)
}

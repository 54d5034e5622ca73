//! Logical folder paths.
//!
//! A logical path is relative to the storage root, uses `/` as separator and
//! never contains empty, `.` or `..` components once normalized. The root
//! itself is the empty string.

use std::path::{Path, PathBuf};

use crate::{Result, StoreError};

/// Normalize a caller-supplied logical path.
///
/// `..` components are resolved lexically; a path that would climb above
/// the root is rejected with [`StoreError::InvalidPath`], as are components
/// containing a backslash or NUL byte.
pub fn normalize(rel_path: &str) -> Result<String> {
    let mut parts: Vec<&str> = Vec::new();

    for component in rel_path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(StoreError::InvalidPath);
                }
            }
            c if c.contains('\\') || c.contains('\0') => return Err(StoreError::InvalidPath),
            c => parts.push(c),
        }
    }

    Ok(parts.join("/"))
}

/// Parent of a normalized path, or `None` for the root.
pub fn parent(rel_path: &str) -> Option<&str> {
    if rel_path.is_empty() {
        return None;
    }
    Some(rel_path.rsplit_once('/').map(|(p, _)| p).unwrap_or(""))
}

/// Join a normalized parent path and a single name.
pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

/// Last component of a normalized path (empty for the root).
pub fn file_name(rel_path: &str) -> &str {
    rel_path.rsplit('/').next().unwrap_or("")
}

/// Whether `ancestor` is `rel_path` itself or one of its ancestors.
pub fn is_ancestor_or_self(ancestor: &str, rel_path: &str) -> bool {
    ancestor.is_empty()
        || rel_path == ancestor
        || rel_path
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Absolute directory of a normalized logical path.
pub fn to_fs_path(root: &Path, rel_path: &str) -> PathBuf {
    if rel_path.is_empty() {
        root.to_path_buf()
    } else {
        root.join(rel_path)
    }
}

/// Validate a single display name (file or subfolder).
///
/// Names must be non-empty, must not contain a separator and must not start
/// with a dot: dot-entries are reserved for configs and temporary files.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.starts_with('.')
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(StoreError::InvalidPath);
    }
    Ok(())
}

//! Capability tokens.
//!
//! A token is a bag of proofs. Each proof binds an access kind and a config
//! root to the password hash that was current when the proof was issued.
//! Changing a password changes the hash, so old proofs stop matching
//! without any revocation list.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::folder::{AccessKind, Folder, FolderConfig};
use crate::{Result, StoreError};

/// One proof of access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// Access kind granted.
    pub kind: AccessKind,
    /// Resource id of the config root.
    pub resource_id: Uuid,
    /// Stored password hash at issue time.
    pub code: String,
}

/// A set of grants, at most one per (kind, resource id).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityToken {
    grants: Vec<Grant>,
}

impl CapabilityToken {
    /// An empty token (anonymous access).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a grant, replacing an existing one for the same kind and resource.
    pub fn insert(&mut self, grant: Grant) {
        self.grants
            .retain(|g| !(g.kind == grant.kind && g.resource_id == grant.resource_id));
        self.grants.push(grant);
    }

    /// Merge all grants of `other` into this token.
    pub fn merge(&mut self, other: CapabilityToken) {
        for grant in other.grants {
            self.insert(grant);
        }
    }

    /// Code presented for a kind and resource.
    pub fn code_for(&self, kind: AccessKind, resource_id: Uuid) -> Option<&str> {
        self.grants
            .iter()
            .find(|g| g.kind == kind && g.resource_id == resource_id)
            .map(|g| g.code.as_str())
    }

    /// All grants.
    pub fn grants(&self) -> &[Grant] {
        &self.grants
    }

    /// Whether the token carries no grants.
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

/// Issue a token proving knowledge of the current `kind` password.
pub fn issue_token(config: &FolderConfig, config_root_id: Uuid, kind: AccessKind) -> CapabilityToken {
    let mut token = CapabilityToken::new();
    token.insert(Grant {
        kind,
        resource_id: config_root_id,
        code: config.hash_for(kind).to_string(),
    });
    token
}

/// Check that `token` grants `kind` access to `folder`.
///
/// Reading a folder with an empty read hash needs no proof. A folder with
/// an empty write hash is not writable by anyone. The error carries the
/// folder path and is the same whether the proof is missing or stale.
pub fn authorize(folder: &Folder, kind: AccessKind, token: &CapabilityToken) -> Result<()> {
    let stored = folder.config.hash_for(kind);

    let granted = if stored.is_empty() {
        kind == AccessKind::Read
    } else {
        token.code_for(kind, folder.config_root_id()) == Some(stored)
    };

    if granted {
        return Ok(());
    }

    let folder = folder.rel_path.clone();
    Err(match kind {
        AccessKind::Read => StoreError::NoReadAccess { folder },
        AccessKind::Write => StoreError::NoWriteAccess { folder },
    })
}

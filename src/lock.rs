//! Per-process resource locks.
//!
//! Mutations of a folder are serialized per config root: sibling folders
//! that share one config also share cached state, so they share a lock.
//! Locks never wait. A held key makes [`ResourceLock::acquire`] fail with
//! [`StoreError::ResourceBusy`] and the caller decides whether to retry.
//!
//! Only the current process is covered; several processes serving one
//! storage root can still race each other.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::{Result, StoreError};

/// Table of held keys.
#[derive(Debug, Clone, Default)]
pub struct ResourceLock {
    held: Arc<Mutex<HashSet<String>>>,
}

impl ResourceLock {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set holds no payload, so a poisoned table is still consistent.
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take the lock for `key` without waiting.
    pub fn acquire(&self, key: &str) -> Result<LockGuard> {
        if !self.table().insert(key.to_string()) {
            debug!(key, "resource busy");
            return Err(StoreError::ResourceBusy);
        }

        debug!(key, "lock acquired");
        Ok(LockGuard {
            held: Arc::clone(&self.held),
            key: key.to_string(),
            released: false,
        })
    }

    /// Whether `key` is currently held.
    pub fn is_held(&self, key: &str) -> bool {
        self.table().contains(key)
    }
}

/// Proof of holding a key. Dropping it releases the key.
#[derive(Debug)]
pub struct LockGuard {
    held: Arc<Mutex<HashSet<String>>>,
    key: String,
    released: bool,
}

impl LockGuard {
    /// Key this guard holds.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the key. Calling this more than once has no effect.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
        debug!(key = %self.key, "lock released");
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release();
    }
}

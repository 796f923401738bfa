// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Persistent key-value substrate for the log store.
//!
//! The log store keeps each of its blobs under its own key and never needs a
//! cross-key transaction. Both implementations enforce an optional byte quota
//! shared by every key, mirroring the finite storage budget of a client
//! device. A write that would exceed the quota fails with
//! [`StoreError::QuotaExceeded`] and leaves the previous value in place.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use sled::{Config as SledConfig, Db, Tree};
use tracing::debug;

use crate::error::StoreError;

/// Name of the sled tree holding telemetry blobs.
const TELEMETRY_TREE: &str = "telemetry";

pub trait KeyValueStore: Send + Sync {
    /// Retrieves the value stored for `key`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replaces the value stored for `key`.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Removes the value stored for `key`, if any.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Makes previous writes durable.
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

fn check_quota(
    quota: Option<usize>,
    other_bytes: usize,
    key: &str,
    value: &[u8],
) -> Result<(), StoreError> {
    let Some(quota) = quota else {
        return Ok(());
    };
    let needed = other_bytes + key.len() + value.len();
    if needed > quota {
        return Err(StoreError::QuotaExceeded { needed, quota });
    }
    Ok(())
}

/// Sled-backed store, on disk or temporary.
#[derive(Debug, Clone)]
pub struct SledStore {
    db: Db,
    tree: Tree,
    path: PathBuf,
    quota: Option<usize>,
}

impl SledStore {
    /// Opens (or creates) a store at `path`.
    pub fn open<P: AsRef<Path>>(path: P, quota: Option<usize>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                // sled does not create intermediate directories automatically.
                fs::create_dir_all(parent)?;
            }
        }
        let db = SledConfig::new().path(&path).open()?;
        let tree = db.open_tree(TELEMETRY_TREE)?;
        debug!("Opened telemetry store at {}", path.display());
        Ok(Self {
            db,
            tree,
            path,
            quota,
        })
    }

    /// Opens an in-memory store that disappears when dropped.
    pub fn open_ephemeral(quota: Option<usize>) -> Result<Self, StoreError> {
        let db = SledConfig::new().temporary(true).open()?;
        let tree = db.open_tree(TELEMETRY_TREE)?;
        Ok(Self {
            db,
            tree,
            path: PathBuf::new(),
            quota,
        })
    }

    /// Returns the filesystem path backing the store.
    ///
    /// Ephemeral stores return an empty path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn bytes_excluding(&self, key: &str) -> Result<usize, StoreError> {
        let mut total = 0;
        for result in self.tree.iter() {
            let (k, v) = result?;
            if k.as_ref() != key.as_bytes() {
                total += k.len() + v.len();
            }
        }
        Ok(total)
    }
}

impl KeyValueStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.tree.get(key)?.map(|value| value.as_ref().to_vec()))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        if self.quota.is_some() {
            check_quota(self.quota, self.bytes_excluding(key)?, key, value)?;
        }
        self.tree.insert(key, value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.tree.remove(key)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    quota: Option<usize>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: Mutex::default(),
            quota: Some(quota),
        }
    }

    /// Total bytes currently stored, keys included.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let other_bytes = entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum();
        check_quota(self.quota, other_bytes, key, value)?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

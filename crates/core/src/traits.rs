//! Collaborator interfaces the core consumes.
//!
//! The substrate does not own its filesystem primitive, shared cache, or
//! the store-repository/registry pair it replays during fast-forward; it
//! programs against the traits below. `cairn-fs` and `cairn-concurrency`
//! ship the default [`FileIo`] and [`L2Cache`] implementations; the
//! repository/registry/copier seams are provided by the host.

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::types::{Handle, RegistryPayload, StoreInfo};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// One entry returned by [`FileIo::read_dir`].
#[derive(Debug, Clone)]
pub struct DirEntryInfo {
    /// File or directory name (no parent path).
    pub name: String,
    /// Last-modified time.
    pub modified: SystemTime,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

/// Retryable file and directory operations.
///
/// Implementations retry transient failures internally and report a
/// typed [`Error::FileIo`] on permanent failure. Every call observes the
/// cancellation token, including mid-backoff.
pub trait FileIo: Send + Sync {
    /// Write `data` to `path`, creating parent directories if a first
    /// attempt fails because they are missing. Overwrites.
    fn write_file(&self, tok: &CancelToken, path: &Path, data: &[u8]) -> Result<()>;

    /// Read the whole file.
    fn read_file(&self, tok: &CancelToken, path: &Path) -> Result<Vec<u8>>;

    /// Remove a file. Removing an absent file is not an error.
    fn remove(&self, tok: &CancelToken, path: &Path) -> Result<()>;

    /// Whether the path exists.
    fn exists(&self, tok: &CancelToken, path: &Path) -> bool;

    /// Recursively remove a directory tree. Absent tree is not an error.
    fn remove_all(&self, tok: &CancelToken, path: &Path) -> Result<()>;

    /// Create a directory chain. Existing chain is not an error.
    fn mkdir_all(&self, tok: &CancelToken, path: &Path) -> Result<()>;

    /// List a directory.
    fn read_dir(&self, tok: &CancelToken, path: &Path) -> Result<Vec<DirEntryInfo>>;
}

/// Shared key/value cache with TTLs and a cooperative lock table.
///
/// The cache is best-effort: callers in this workspace warn and continue
/// on cache errors wherever the contract allows. Lock acquisition is
/// all-or-nothing across the given keys and returns an owner ID used for
/// the held-check and release.
pub trait L2Cache: Send + Sync {
    /// Set raw bytes under `key`, with an optional TTL.
    fn set(&self, tok: &CancelToken, key: &str, value: &[u8], ttl: Option<Duration>)
        -> Result<()>;

    /// Get raw bytes under `key`, refreshing the entry's TTL when
    /// `refresh_ttl` is given (GET_EX semantics). `None` when absent or
    /// expired.
    fn get(
        &self,
        tok: &CancelToken,
        key: &str,
        refresh_ttl: Option<Duration>,
    ) -> Result<Option<Vec<u8>>>;

    /// Delete `key`. Absent key is not an error.
    fn delete(&self, tok: &CancelToken, key: &str) -> Result<()>;

    /// Try to take every key for `ttl`. Returns the owner ID when all
    /// were acquired, `None` when any is held by someone else.
    fn lock(&self, tok: &CancelToken, keys: &[String], ttl: Duration) -> Result<Option<Uuid>>;

    /// Whether every key is still held by `owner`.
    fn is_locked(&self, tok: &CancelToken, keys: &[String], owner: Uuid) -> Result<bool>;

    /// Release the keys held by `owner`. Keys held by others are left
    /// alone.
    fn unlock(&self, tok: &CancelToken, keys: &[String], owner: Uuid) -> Result<()>;

    /// Namespacing for lock keys, kept distinct from value keys.
    fn format_lock_key(&self, key: &str) -> String {
        format!("L{key}")
    }
}

/// Struct get/set over any [`L2Cache`], JSON-marshalled.
pub trait L2CacheExt {
    /// Marshal `value` and set it under `key`.
    fn set_struct<T: Serialize>(
        &self,
        tok: &CancelToken,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()>;

    /// Get and unmarshal the struct under `key`.
    fn get_struct<T: DeserializeOwned>(
        &self,
        tok: &CancelToken,
        key: &str,
        refresh_ttl: Option<Duration>,
    ) -> Result<Option<T>>;
}

impl<C: L2Cache + ?Sized> L2CacheExt for C {
    fn set_struct<T: Serialize>(
        &self,
        tok: &CancelToken,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.set(tok, key, &bytes, ttl)
    }

    fn get_struct<T: DeserializeOwned>(
        &self,
        tok: &CancelToken,
        key: &str,
        refresh_ttl: Option<Duration>,
    ) -> Result<Option<T>> {
        match self.get(tok, key, refresh_ttl)? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| Error::Cache(format!("cached struct under {key:?}: {e}")))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

/// Store repository seam consumed during fast-forward.
pub trait StoreRepository: Send + Sync {
    /// Apply store descriptors to the passive target.
    fn replicate(&self, tok: &CancelToken, stores: &[StoreInfo]) -> Result<()>;

    /// Current item count for a store, from the repository's cache.
    fn get_store_count(&self, tok: &CancelToken, name: &str) -> Result<i64>;
}

/// Registry seam consumed during fast-forward.
pub trait Registry: Send + Sync {
    /// Apply one commit's registry mutations to the passive target.
    fn replicate(
        &self,
        tok: &CancelToken,
        new_root: &[RegistryPayload<Handle>],
        added: &[RegistryPayload<Handle>],
        updated: &[RegistryPayload<Handle>],
        removed: &[RegistryPayload<Handle>],
    ) -> Result<()>;
}

/// Bulk copier that seeds a reinstated passive target from the active
/// side before commit logs are fast-forwarded onto it.
pub trait StoreCopier: Send + Sync {
    /// Copy stores and registries from the active to the passive folder.
    fn copy_to_passive_folders(&self, tok: &CancelToken) -> Result<()>;
}

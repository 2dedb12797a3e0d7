//! In-process shared cache with TTLs and a cooperative lock table.

use cairn_core::{CancelToken, L2Cache, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct ValueEntry {
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

#[derive(Debug, Clone, Copy)]
struct LockEntry {
    owner: Uuid,
    expires_at: Instant,
}

/// In-process [`L2Cache`].
///
/// Values expire lazily: an expired entry is dropped on the next read.
/// Lock acquisition is all-or-nothing across the requested keys; on a
/// conflict the keys taken so far are rolled back, so a failed `lock`
/// leaves no residue.
#[derive(Debug, Default)]
pub struct MemoryCache {
    values: DashMap<String, ValueEntry>,
    locks: DashMap<String, LockEntry>,
}

impl MemoryCache {
    /// Empty cache.
    pub fn new() -> Self {
        MemoryCache::default()
    }
}

impl L2Cache for MemoryCache {
    fn set(
        &self,
        tok: &CancelToken,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<()> {
        tok.ensure_active()?;
        self.values.insert(
            key.to_string(),
            ValueEntry {
                bytes: value.to_vec(),
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
        Ok(())
    }

    fn get(
        &self,
        tok: &CancelToken,
        key: &str,
        refresh_ttl: Option<Duration>,
    ) -> Result<Option<Vec<u8>>> {
        tok.ensure_active()?;
        let now = Instant::now();
        match self.values.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at.is_some_and(|at| at <= now) {
                    occupied.remove();
                    return Ok(None);
                }
                if let Some(ttl) = refresh_ttl {
                    occupied.get_mut().expires_at = Some(now + ttl);
                }
                Ok(Some(occupied.get().bytes.clone()))
            }
            Entry::Vacant(_) => Ok(None),
        }
    }

    fn delete(&self, tok: &CancelToken, key: &str) -> Result<()> {
        tok.ensure_active()?;
        self.values.remove(key);
        Ok(())
    }

    fn lock(&self, tok: &CancelToken, keys: &[String], ttl: Duration) -> Result<Option<Uuid>> {
        tok.ensure_active()?;
        let owner = Uuid::new_v4();
        let now = Instant::now();
        let entry = LockEntry {
            owner,
            expires_at: now + ttl,
        };

        for (taken, key) in keys.iter().enumerate() {
            let acquired = match self.locks.entry(key.clone()) {
                Entry::Occupied(mut occupied) => {
                    if occupied.get().expires_at <= now {
                        occupied.insert(entry);
                        true
                    } else {
                        false
                    }
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(entry);
                    true
                }
            };
            if !acquired {
                // Roll back what we took; the whole set or nothing.
                for key in keys.iter().take(taken) {
                    self.locks.remove_if(key, |_, e| e.owner == owner);
                }
                return Ok(None);
            }
        }
        Ok(Some(owner))
    }

    fn is_locked(&self, tok: &CancelToken, keys: &[String], owner: Uuid) -> Result<bool> {
        tok.ensure_active()?;
        let now = Instant::now();
        for key in keys {
            let held = self
                .locks
                .get(key)
                .is_some_and(|e| e.owner == owner && e.expires_at > now);
            if !held {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn unlock(&self, tok: &CancelToken, keys: &[String], owner: Uuid) -> Result<()> {
        tok.ensure_active()?;
        for key in keys {
            self.locks.remove_if(key, |_, e| e.owner == owner);
        }
        Ok(())
    }
}

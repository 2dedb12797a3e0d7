//! Replication status: the process-global cell and the on-disk record.

use cairn_core::{CancelToken, FileIo, ReplicationStatus, Result};
use once_cell::sync::Lazy;
use parking_lot::{Mutex, MutexGuard};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

/// Status file name under each base folder.
pub const REPLICATION_STATUS_FILE: &str = "replstat.txt";

/// Cache key of the status mirror.
pub const REPLICATION_STATUS_CACHE_KEY: &str = "replstat";

/// Mutex-guarded owner of a `ReplicationStatus`.
///
/// Exactly one cell exists per process in production (see
/// [`process_cell`]); tests construct private cells for isolation. All
/// state transitions happen while holding [`StatusCell::lock`]; readers
/// get value copies and never a reference into the critical section.
#[derive(Debug, Default)]
pub struct StatusCell {
    inner: Mutex<ReplicationStatus>,
}

impl StatusCell {
    /// Cell holding the default (first bring-up) status.
    pub fn new() -> Arc<Self> {
        Arc::new(StatusCell::default())
    }

    /// Value copy of the current status.
    pub fn get(&self) -> ReplicationStatus {
        *self.inner.lock()
    }

    /// Replace the status.
    pub fn set(&self, status: ReplicationStatus) {
        *self.inner.lock() = status;
    }

    /// Enter the critical section.
    pub fn lock(&self) -> MutexGuard<'_, ReplicationStatus> {
        self.inner.lock()
    }
}

static PROCESS_CELL: Lazy<Arc<StatusCell>> = Lazy::new(StatusCell::new);

/// The process-wide status cell.
pub fn process_cell() -> Arc<StatusCell> {
    Arc::clone(&PROCESS_CELL)
}

/// Read `<base>/replstat.txt`; `None` when the file does not exist.
pub fn read_status_file(
    io: &dyn FileIo,
    tok: &CancelToken,
    base: &Path,
) -> Result<Option<ReplicationStatus>> {
    let path = base.join(REPLICATION_STATUS_FILE);
    if !io.exists(tok, &path) {
        return Ok(None);
    }
    let bytes = io.read_file(tok, &path)?;
    let status = serde_json::from_slice(&bytes)?;
    Ok(Some(status))
}

/// Write `<base>/replstat.txt`.
pub fn write_status_file(
    io: &dyn FileIo,
    tok: &CancelToken,
    base: &Path,
    status: &ReplicationStatus,
) -> Result<()> {
    let path = base.join(REPLICATION_STATUS_FILE);
    let bytes = serde_json::to_vec(status)?;
    io.write_file(tok, &path, &bytes)
}

/// Modification time of `<base>/replstat.txt`, if present.
pub fn status_file_mtime(
    io: &dyn FileIo,
    tok: &CancelToken,
    base: &Path,
) -> Result<Option<SystemTime>> {
    let entries = io.read_dir(tok, base)?;
    Ok(entries
        .into_iter()
        .find(|e| e.name == REPLICATION_STATUS_FILE)
        .map(|e| e.modified))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_hands_out_value_copies() {
        let cell = StatusCell::new();
        let mut copy = cell.get();
        copy.failed_to_replicate = true;
        // Mutating the copy must not leak back into the cell.
        assert!(!cell.get().failed_to_replicate);

        cell.set(copy);
        assert!(cell.get().failed_to_replicate);
    }

    #[test]
    fn process_cell_is_shared() {
        let a = process_cell();
        let b = process_cell();
        assert!(Arc::ptr_eq(&a, &b));
    }
}

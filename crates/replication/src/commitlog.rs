//! Commit-change log files.
//!
//! One file per tracker TID under `<active>/commitlogs/`, each holding a
//! single bincode-marshalled [`CommitChangeRecord`]. The folder is
//! provisioned by the host alongside the base folders; writing into a
//! missing folder is an error, never a silent mkdir.

use cairn_core::{CancelToken, CommitChangeRecord, Error, FileIo, Result, Tid};
use std::path::{Path, PathBuf};

/// Commit-change log folder name under a base folder.
pub const COMMIT_LOG_FOLDER: &str = "commitlogs";

/// Write the commit-change record for `tid` under `base`.
pub fn write_commit_log(
    io: &dyn FileIo,
    tok: &CancelToken,
    base: &Path,
    tid: Tid,
    record: &CommitChangeRecord,
) -> Result<()> {
    let dir = base.join(COMMIT_LOG_FOLDER);
    if !io.exists(tok, &dir) {
        return Err(Error::Replication(format!(
            "commit log folder {} does not exist",
            dir.display()
        )));
    }
    let bytes =
        bincode::serialize(record).map_err(|e| Error::Serialization(e.to_string()))?;
    io.write_file(tok, &dir.join(format!("{tid}.log")), &bytes)
}

/// Path of the oldest commit log under `base`, or `None` when the
/// folder is absent or holds no logs.
pub fn oldest_commit_log(
    io: &dyn FileIo,
    tok: &CancelToken,
    base: &Path,
) -> Result<Option<PathBuf>> {
    let dir = base.join(COMMIT_LOG_FOLDER);
    if !io.exists(tok, &dir) {
        return Ok(None);
    }
    let mut logs: Vec<_> = io
        .read_dir(tok, &dir)?
        .into_iter()
        .filter(|e| !e.is_dir && e.name.ends_with(".log"))
        .collect();
    if logs.is_empty() {
        return Ok(None);
    }
    // Descending by mtime; the queue drains from the tail, oldest first.
    logs.sort_by(|a, b| b.modified.cmp(&a.modified));
    let oldest = logs.last().expect("non-empty");
    Ok(Some(dir.join(&oldest.name)))
}

/// Read and unmarshal one commit log.
pub fn read_commit_log(
    io: &dyn FileIo,
    tok: &CancelToken,
    path: &Path,
) -> Result<CommitChangeRecord> {
    let bytes = io.read_file(tok, path)?;
    bincode::deserialize(&bytes).map_err(|e| Error::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::StoreInfo;
    use cairn_fs::RetryFileIo;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn record(name: &str) -> CommitChangeRecord {
        CommitChangeRecord {
            stores: vec![StoreInfo {
                name: name.to_string(),
                count: 1,
                timestamp: 0,
            }],
            ..CommitChangeRecord::default()
        }
    }

    #[test]
    fn write_requires_an_existing_folder() {
        let dir = TempDir::new().unwrap();
        let io = RetryFileIo::new();
        let tok = CancelToken::new();

        let err = write_commit_log(&io, &tok, dir.path(), Uuid::new_v4(), &record("s"))
            .unwrap_err();
        assert!(matches!(err, Error::Replication(_)));

        io.mkdir_all(&tok, &dir.path().join(COMMIT_LOG_FOLDER)).unwrap();
        write_commit_log(&io, &tok, dir.path(), Uuid::new_v4(), &record("s")).unwrap();
    }

    #[test]
    fn oldest_log_is_selected() {
        let dir = TempDir::new().unwrap();
        let io = RetryFileIo::new();
        let tok = CancelToken::new();
        io.mkdir_all(&tok, &dir.path().join(COMMIT_LOG_FOLDER)).unwrap();

        let first = Uuid::new_v4();
        write_commit_log(&io, &tok, dir.path(), first, &record("first")).unwrap();
        // Age the first log so the ordering does not depend on write
        // timing granularity.
        let path = dir
            .path()
            .join(COMMIT_LOG_FOLDER)
            .join(format!("{first}.log"));
        let aged = std::time::SystemTime::now() - std::time::Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(aged)
            .unwrap();
        write_commit_log(&io, &tok, dir.path(), Uuid::new_v4(), &record("second")).unwrap();

        let oldest = oldest_commit_log(&io, &tok, dir.path()).unwrap().unwrap();
        assert_eq!(oldest, path);
        assert_eq!(
            read_commit_log(&io, &tok, &oldest).unwrap().stores[0].name,
            "first"
        );
    }

    #[test]
    fn absent_folder_means_no_work() {
        let dir = TempDir::new().unwrap();
        let io = RetryFileIo::new();
        let tok = CancelToken::new();
        assert!(oldest_commit_log(&io, &tok, dir.path()).unwrap().is_none());
    }
}

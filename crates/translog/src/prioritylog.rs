//! Per-TID priority records with backups and aged batch enumeration.

use cairn_core::{CancelToken, Error, FileIo, Handle, RegistryPayload, Result, Tid};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::translog::TRANS_LOG_FOLDER;

/// Batch size used when the caller passes zero.
pub const PRIORITY_BATCH_DEFAULT: usize = 25;

const PRIORITY_EXT: &str = "plg";
const BACKUP_EXT: &str = "bak";

/// Tuning knobs for [`PriorityLog`].
#[derive(Debug, Clone)]
pub struct PriorityLogOptions {
    /// Minimum file age before a TID shows up in a batch.
    pub min_age_minutes: i64,
}

impl Default for PriorityLogOptions {
    fn default() -> Self {
        PriorityLogOptions { min_age_minutes: 5 }
    }
}

/// Priority log: one bincode block of registry payloads per TID.
///
/// Lives alongside the transaction logs under `<active>/translogs/`,
/// with `.plg` payloads and `.bak` backups.
pub struct PriorityLog {
    base: PathBuf,
    file_io: Arc<dyn FileIo>,
    options: PriorityLogOptions,
}

impl PriorityLog {
    /// Priority log over the given active base folder.
    pub fn new(base: impl Into<PathBuf>, file_io: Arc<dyn FileIo>) -> Self {
        PriorityLog {
            base: base.into(),
            file_io,
            options: PriorityLogOptions::default(),
        }
    }

    /// Override the batch aging.
    pub fn with_options(mut self, options: PriorityLogOptions) -> Self {
        self.options = options;
        self
    }

    fn folder(&self) -> PathBuf {
        self.base.join(TRANS_LOG_FOLDER)
    }

    fn path(&self, tid: Tid, ext: &str) -> PathBuf {
        self.folder().join(format!("{tid}.{ext}"))
    }

    /// Write `tid`'s priority payload, creating the folder if needed.
    pub fn add(
        &self,
        tok: &CancelToken,
        tid: Tid,
        payloads: &[RegistryPayload<Handle>],
    ) -> Result<()> {
        self.file_io.mkdir_all(tok, &self.folder())?;
        self.write(tok, tid, PRIORITY_EXT, payloads)
    }

    /// Read `tid`'s payload; `None` when absent.
    pub fn get(
        &self,
        tok: &CancelToken,
        tid: Tid,
    ) -> Result<Option<Vec<RegistryPayload<Handle>>>> {
        self.read(tok, tid, PRIORITY_EXT)
    }

    /// Delete `tid`'s payload. Absent is fine.
    pub fn remove(&self, tok: &CancelToken, tid: Tid) -> Result<()> {
        self.file_io.remove(tok, &self.path(tid, PRIORITY_EXT))
    }

    /// Write `tid`'s backup copy.
    pub fn write_backup(
        &self,
        tok: &CancelToken,
        tid: Tid,
        payloads: &[RegistryPayload<Handle>],
    ) -> Result<()> {
        self.file_io.mkdir_all(tok, &self.folder())?;
        self.write(tok, tid, BACKUP_EXT, payloads)
    }

    /// Read `tid`'s backup copy; `None` when absent.
    pub fn get_backup(
        &self,
        tok: &CancelToken,
        tid: Tid,
    ) -> Result<Option<Vec<RegistryPayload<Handle>>>> {
        self.read(tok, tid, BACKUP_EXT)
    }

    /// Delete `tid`'s backup copy. Absent is fine.
    pub fn remove_backup(&self, tok: &CancelToken, tid: Tid) -> Result<()> {
        self.file_io.remove(tok, &self.path(tid, BACKUP_EXT))
    }

    /// Enumerate aged priority payloads, newest first, at most `size`
    /// (zero means the default of 25).
    ///
    /// A payload that fails to read ends the enumeration; the batch
    /// collected so far is returned together with that error.
    pub fn get_batch(
        &self,
        tok: &CancelToken,
        size: usize,
    ) -> (Vec<(Tid, Vec<RegistryPayload<Handle>>)>, Option<Error>) {
        let size = if size == 0 {
            PRIORITY_BATCH_DEFAULT
        } else {
            size
        };
        let candidates = match self.aged_candidates(tok) {
            Ok(c) => c,
            Err(e) => return (Vec::new(), Some(e)),
        };

        let mut batch = Vec::new();
        for (tid, _) in candidates.into_iter().take(size) {
            match self.get(tok, tid) {
                Ok(Some(payloads)) => batch.push((tid, payloads)),
                Ok(None) => debug!(%tid, "priority log vanished mid-batch, skipping"),
                Err(e) => return (batch, Some(e)),
            }
        }
        (batch, None)
    }

    /// UUID-named `.plg` files old enough to batch, descending by mtime.
    fn aged_candidates(&self, tok: &CancelToken) -> Result<Vec<(Tid, DateTime<Utc>)>> {
        let folder = self.folder();
        if !self.file_io.exists(tok, &folder) {
            return Ok(Vec::new());
        }
        let cutoff = Utc::now() - ChronoDuration::minutes(self.options.min_age_minutes);
        let suffix = format!(".{PRIORITY_EXT}");
        let mut candidates: Vec<(Tid, DateTime<Utc>)> = Vec::new();
        for entry in self.file_io.read_dir(tok, &folder)? {
            if entry.is_dir || !entry.name.ends_with(&suffix) {
                continue;
            }
            let stem = entry.name.trim_end_matches(&suffix);
            let Ok(tid) = Uuid::parse_str(stem) else {
                continue;
            };
            let mtime = DateTime::<Utc>::from(entry.modified);
            if mtime <= cutoff {
                candidates.push((tid, mtime));
            }
        }
        candidates.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(candidates)
    }

    fn write(
        &self,
        tok: &CancelToken,
        tid: Tid,
        ext: &str,
        payloads: &[RegistryPayload<Handle>],
    ) -> Result<()> {
        let bytes =
            bincode::serialize(payloads).map_err(|e| Error::Serialization(e.to_string()))?;
        self.file_io.write_file(tok, &self.path(tid, ext), &bytes)
    }

    fn read(
        &self,
        tok: &CancelToken,
        tid: Tid,
        ext: &str,
    ) -> Result<Option<Vec<RegistryPayload<Handle>>>> {
        let path = self.path(tid, ext);
        if !self.file_io.exists(tok, &path) {
            return Ok(None);
        }
        let bytes = self.file_io.read_file(tok, &path)?;
        let payloads =
            bincode::deserialize(&bytes).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Some(payloads))
    }
}

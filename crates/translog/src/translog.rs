//! Append-only per-transaction log with single-sweeper discovery.

use cairn_core::{CancelToken, Error, FileIo, L2Cache, LogRecord, Result, Tid};
use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::debug;
use uuid::Uuid;

/// Transaction-log folder name under the active base folder.
pub const TRANS_LOG_FOLDER: &str = "translogs";

/// Shared hour-lock key; one sweeper across all processes.
pub const HOUR_LOCK_KEY: &str = "HBP";

const HOUR_FORMAT: &str = "%Y-%m-%dT%H";

/// Tuning knobs for [`TransactionLog`].
#[derive(Debug, Clone)]
pub struct TransactionLogOptions {
    /// Minimum file age before a TID becomes sweepable: the transaction
    /// cap plus slack.
    pub age_limit_minutes: i64,
    /// TTL of the hour lock.
    pub lock_ttl: Duration,
    /// How far back a single cleaner may reach, in hours.
    pub claim_window_hours: i64,
}

impl Default for TransactionLogOptions {
    fn default() -> Self {
        TransactionLogOptions {
            // 60 minute transaction cap + 10 minutes slack.
            age_limit_minutes: 70,
            lock_ttl: Duration::from_secs(7 * 3600),
            claim_window_hours: 4,
        }
    }
}

/// One claimed sweep unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepItem {
    /// Transaction whose log was claimed.
    pub tid: Tid,
    /// The file's modification hour, `YYYY-MM-DDTHH`.
    pub hour: String,
    /// Every well-formed record in the file.
    pub records: Vec<LogRecord>,
}

struct OpenLog {
    tid: Tid,
    writer: BufWriter<File>,
}

struct SweepLock {
    owner: Uuid,
    keys: Vec<String>,
}

/// Append-only per-TID transaction log.
///
/// The append handle is owned by this instance for the lifetime of the
/// currently-appending TID and closed on [`TransactionLog::remove`] or
/// on an append failure. Discovery (`get_one`) is serialised across
/// processes by the shared hour lock.
pub struct TransactionLog {
    base: PathBuf,
    file_io: Arc<dyn FileIo>,
    cache: Arc<dyn L2Cache>,
    options: TransactionLogOptions,
    open: Mutex<Option<OpenLog>>,
    sweep: Mutex<Option<SweepLock>>,
}

impl TransactionLog {
    /// Log over the given active base folder.
    pub fn new(
        base: impl Into<PathBuf>,
        file_io: Arc<dyn FileIo>,
        cache: Arc<dyn L2Cache>,
    ) -> Self {
        TransactionLog {
            base: base.into(),
            file_io,
            cache,
            options: TransactionLogOptions::default(),
            open: Mutex::new(None),
            sweep: Mutex::new(None),
        }
    }

    /// Override the sweep tuning.
    pub fn with_options(mut self, options: TransactionLogOptions) -> Self {
        self.options = options;
        self
    }

    fn folder(&self) -> PathBuf {
        self.base.join(TRANS_LOG_FOLDER)
    }

    fn log_path(&self, tid: Tid) -> PathBuf {
        self.folder().join(format!("{tid}.log"))
    }

    /// Append one record to `tid`'s log, creating the file (and the
    /// folder) on the first append. The buffer is flushed per record so
    /// a crash loses at most the record being written.
    pub fn add(&self, tok: &CancelToken, tid: Tid, key: i32, payload: &[u8]) -> Result<()> {
        tok.ensure_active()?;
        let mut guard = self.open.lock();
        if guard.as_ref().map(|o| o.tid) != Some(tid) {
            self.file_io.mkdir_all(tok, &self.folder())?;
            let path = self.log_path(tid);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| Error::FileIo { path, source: e })?;
            *guard = Some(OpenLog {
                tid,
                writer: BufWriter::new(file),
            });
        }

        let record = LogRecord {
            key,
            value: payload.to_vec(),
        };
        let open = guard.as_mut().expect("handle opened above");
        let appended = (|| -> Result<()> {
            serde_json::to_writer(&mut open.writer, &record)?;
            open.writer.write_all(b"\n")?;
            open.writer.flush()?;
            Ok(())
        })();
        if appended.is_err() {
            // A handle that failed mid-record is not reusable.
            *guard = None;
        }
        appended
    }

    /// Close the handle if it is `tid`'s and delete the log file.
    /// Removing an already-absent TID is fine.
    pub fn remove(&self, tok: &CancelToken, tid: Tid) -> Result<()> {
        {
            let mut guard = self.open.lock();
            if guard.as_ref().map(|o| o.tid) == Some(tid) {
                *guard = None;
            }
        }
        self.file_io.remove(tok, &self.log_path(tid))
    }

    /// Claim the single eligible log under the shared hour lock.
    ///
    /// Returns `None` without error when the lock is contested, nothing
    /// is eligible, or the lock was lost before hand-off. On a claim the
    /// lock stays held; the sweeper continues with
    /// [`TransactionLog::get_one_of_hour`] and the lock is released when
    /// the claimed hour falls out of the window (or via
    /// [`TransactionLog::end_sweep`]).
    pub fn get_one(&self, tok: &CancelToken) -> Result<Option<SweepItem>> {
        tok.ensure_active()?;
        let keys = vec![self.cache.format_lock_key(HOUR_LOCK_KEY)];
        let owner = match self.cache.lock(tok, &keys, self.options.lock_ttl) {
            Ok(Some(owner)) => owner,
            Ok(None) => return Ok(None),
            Err(e) => {
                debug!(error = %e, "hour lock acquisition failed, no work");
                return Ok(None);
            }
        };

        match self.claim_oldest(tok, &keys, owner, None) {
            Ok(Some(item)) => Ok(Some(item)),
            Ok(None) => {
                let _ = self.cache.unlock(tok, &keys, owner);
                Ok(None)
            }
            Err(e) => {
                let _ = self.cache.unlock(tok, &keys, owner);
                Err(e)
            }
        }
    }

    /// Continue a sweep within one hour, `YYYY-MM-DDTHH`.
    ///
    /// An hour more than the claim window in the past releases the lock
    /// and reports no work, bounding a single cleaner's reach.
    pub fn get_one_of_hour(
        &self,
        tok: &CancelToken,
        hour: &str,
    ) -> Result<Option<(Tid, Vec<LogRecord>)>> {
        tok.ensure_active()?;
        if hour.is_empty() {
            return Ok(None);
        }
        let parsed = chrono::NaiveDateTime::parse_from_str(
            &format!("{hour}:00"),
            &format!("{HOUR_FORMAT}:%M"),
        )
        .map_err(|e| Error::Serialization(format!("hour {hour:?}: {e}")))?
        .and_utc();

        if Utc::now() - parsed > ChronoDuration::hours(self.options.claim_window_hours) {
            self.end_sweep(tok);
            return Ok(None);
        }

        let Some(SweepLock { owner, keys }) = self.sweep.lock().as_ref().map(|s| SweepLock {
            owner: s.owner,
            keys: s.keys.clone(),
        }) else {
            return Ok(None);
        };
        let item = self.claim_oldest(tok, &keys, owner, Some(parsed))?;
        Ok(item.map(|i| (i.tid, i.records)))
    }

    /// Release the hour lock held from a previous claim.
    pub fn end_sweep(&self, tok: &CancelToken) {
        if let Some(sweep) = self.sweep.lock().take() {
            let _ = self.cache.unlock(tok, &sweep.keys, sweep.owner);
        }
    }

    fn claim_oldest(
        &self,
        tok: &CancelToken,
        keys: &[String],
        owner: Uuid,
        hour_filter: Option<DateTime<Utc>>,
    ) -> Result<Option<SweepItem>> {
        let now = Utc::now();
        let capped = trunc_hour(now) - ChronoDuration::minutes(self.options.age_limit_minutes);

        let Some((tid, mtime)) = self.oldest_eligible(tok, capped, hour_filter)? else {
            return Ok(None);
        };
        let records = self.read_records(tok, tid)?;

        // Narrow race: the lock may have expired or been stolen between
        // the scan and here; hand out nothing if so.
        let held = self.cache.is_locked(tok, keys, owner).unwrap_or(false);
        if !held {
            debug!(%tid, "hour lock lost before hand-off");
            return Ok(None);
        }
        *self.sweep.lock() = Some(SweepLock {
            owner,
            keys: keys.to_vec(),
        });
        Ok(Some(SweepItem {
            tid,
            hour: trunc_hour(mtime).format(HOUR_FORMAT).to_string(),
            records,
        }))
    }

    /// Oldest file whose stem parses as a UUID and whose modification
    /// hour clears the age gate (and matches `hour_filter` when given).
    fn oldest_eligible(
        &self,
        tok: &CancelToken,
        capped: DateTime<Utc>,
        hour_filter: Option<DateTime<Utc>>,
    ) -> Result<Option<(Tid, DateTime<Utc>)>> {
        let folder = self.folder();
        if !self.file_io.exists(tok, &folder) {
            return Ok(None);
        }
        let mut oldest: Option<(Tid, DateTime<Utc>)> = None;
        for entry in self.file_io.read_dir(tok, &folder)? {
            if entry.is_dir || !entry.name.ends_with(".log") {
                continue;
            }
            let stem = entry.name.trim_end_matches(".log");
            let Ok(tid) = Uuid::parse_str(stem) else {
                continue;
            };
            let mtime = to_utc(entry.modified);
            let file_hour = trunc_hour(mtime);
            if file_hour > capped {
                continue;
            }
            if hour_filter.is_some_and(|h| file_hour != h) {
                continue;
            }
            if oldest.as_ref().map_or(true, |(_, m)| mtime < *m) {
                oldest = Some((tid, mtime));
            }
        }
        Ok(oldest)
    }

    /// Read every well-formed line of `tid`'s log.
    ///
    /// Ill-formed lines are skipped; only a failure to read the file
    /// itself surfaces.
    fn read_records(&self, tok: &CancelToken, tid: Tid) -> Result<Vec<LogRecord>> {
        let bytes = self.file_io.read_file(tok, &self.log_path(tid))?;
        let mut records = Vec::new();
        for line in bytes.split(|&b| b == b'\n') {
            if line.is_empty() {
                continue;
            }
            match serde_json::from_slice::<LogRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => debug!(%tid, error = %e, "skipping unparseable log line"),
            }
        }
        Ok(records)
    }
}

fn trunc_hour(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.date_naive()
        .and_hms_opt(dt.hour(), 0, 0)
        .expect("hour within range")
        .and_utc()
}

fn to_utc(t: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(t)
}

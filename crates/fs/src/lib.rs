//! Default [`FileIo`] implementation: std::fs with a bounded retry
//! policy and cancellation-aware backoff.
//!
//! ## Retry semantics
//!
//! - Transient kinds (`Interrupted`, `WouldBlock`, `TimedOut`) are
//!   retried with exponential backoff up to the attempt limit.
//! - A failed write additionally creates the parent directory chain
//!   before the next attempt, making `write_file` an at-least-once
//!   writer over idempotent (overwrite) targets.
//! - `NotFound` on read is surfaced immediately; on remove it is
//!   success.
//! - Backoff sleeps in small slices and re-checks the token, so
//!   cancellation aborts an in-flight retry promptly.

use cairn_core::{CancelToken, DirEntryInfo, Error, FileIo, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::warn;

/// Retry policy knobs for [`RetryFileIo`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per operation, first try included.
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles per retry.
    pub base_delay: Duration,
    /// Backoff ceiling.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
        }
    }
}

/// Retrying std::fs-backed [`FileIo`].
#[derive(Debug, Default)]
pub struct RetryFileIo {
    policy: RetryPolicy,
}

impl RetryFileIo {
    /// File IO with the default retry policy.
    pub fn new() -> Self {
        RetryFileIo::default()
    }

    /// File IO with a custom retry policy.
    pub fn with_policy(policy: RetryPolicy) -> Self {
        RetryFileIo { policy }
    }

    fn backoff(&self, tok: &CancelToken, attempt: u32) -> Result<()> {
        let exp = self.policy.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1));
        let delay = exp.min(self.policy.max_delay);
        let slice = Duration::from_millis(10).min(delay);
        let mut elapsed = Duration::ZERO;
        while elapsed < delay {
            tok.ensure_active()?;
            std::thread::sleep(slice);
            elapsed += slice;
        }
        Ok(())
    }

    fn retry_loop<T>(
        &self,
        tok: &CancelToken,
        path: &Path,
        mut op: impl FnMut() -> std::io::Result<T>,
    ) -> Result<T> {
        let mut attempt = 0;
        loop {
            tok.ensure_active()?;
            match op() {
                Ok(v) => return Ok(v),
                Err(e) => {
                    attempt += 1;
                    let recoverable = is_retryable(e.kind());
                    if attempt >= self.policy.max_attempts || !recoverable {
                        return Err(Error::FileIo {
                            path: path.to_path_buf(),
                            source: e,
                        });
                    }
                    warn!(path = %path.display(), attempt, error = %e, "file op failed, retrying");
                    self.backoff(tok, attempt)?;
                }
            }
        }
    }
}

fn is_retryable(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
    )
}

impl FileIo for RetryFileIo {
    fn write_file(&self, tok: &CancelToken, path: &Path, data: &[u8]) -> Result<()> {
        let mut attempt = 0;
        loop {
            tok.ensure_active()?;
            match fs::write(path, data) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.policy.max_attempts {
                        return Err(Error::FileIo {
                            path: path.to_path_buf(),
                            source: e,
                        });
                    }
                    if e.kind() == ErrorKind::NotFound {
                        // Parent chain is missing; create it and go again
                        // without burning a backoff slot.
                        if let Some(parent) = path.parent() {
                            if let Err(mk) = fs::create_dir_all(parent) {
                                warn!(path = %parent.display(), error = %mk, "mkdir before write retry failed");
                            }
                        }
                        continue;
                    }
                    if !is_retryable(e.kind()) {
                        return Err(Error::FileIo {
                            path: path.to_path_buf(),
                            source: e,
                        });
                    }
                    warn!(path = %path.display(), attempt, error = %e, "write failed, retrying");
                    self.backoff(tok, attempt)?;
                }
            }
        }
    }

    fn read_file(&self, tok: &CancelToken, path: &Path) -> Result<Vec<u8>> {
        self.retry_loop(tok, path, || fs::read(path))
    }

    fn remove(&self, tok: &CancelToken, path: &Path) -> Result<()> {
        self.retry_loop(
            tok,
            path,
            || match fs::remove_file(path) {
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                other => other,
            },
        )
    }

    fn exists(&self, _tok: &CancelToken, path: &Path) -> bool {
        path.exists()
    }

    fn remove_all(&self, tok: &CancelToken, path: &Path) -> Result<()> {
        self.retry_loop(
            tok,
            path,
            || match fs::remove_dir_all(path) {
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                other => other,
            },
        )
    }

    fn mkdir_all(&self, tok: &CancelToken, path: &Path) -> Result<()> {
        self.retry_loop(tok, path, || fs::create_dir_all(path))
    }

    fn read_dir(&self, tok: &CancelToken, path: &Path) -> Result<Vec<DirEntryInfo>> {
        self.retry_loop(
            tok,
            path,
            || {
                let mut entries = Vec::new();
                for entry in fs::read_dir(path)? {
                    let entry = entry?;
                    let meta = entry.metadata()?;
                    entries.push(DirEntryInfo {
                        name: entry.file_name().to_string_lossy().into_owned(),
                        modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                        is_dir: meta.is_dir(),
                    });
                }
                Ok(entries)
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_creates_missing_parent_chain() {
        let dir = TempDir::new().unwrap();
        let io = RetryFileIo::new();
        let tok = CancelToken::new();
        let path = dir.path().join("a/b/c/blob.bin");

        io.write_file(&tok, &path, b"payload").unwrap();
        assert_eq!(io.read_file(&tok, &path).unwrap(), b"payload");
    }

    #[test]
    fn remove_tolerates_absent_file() {
        let dir = TempDir::new().unwrap();
        let io = RetryFileIo::new();
        let tok = CancelToken::new();

        io.remove(&tok, &dir.path().join("never-written")).unwrap();
        io.remove_all(&tok, &dir.path().join("no-such-tree")).unwrap();
    }

    #[test]
    fn read_of_missing_file_is_a_typed_error() {
        let dir = TempDir::new().unwrap();
        let io = RetryFileIo::new();
        let tok = CancelToken::new();

        let err = io.read_file(&tok, &dir.path().join("ghost")).unwrap_err();
        assert!(matches!(err, Error::FileIo { .. }));
    }

    #[test]
    fn cancelled_token_short_circuits() {
        let dir = TempDir::new().unwrap();
        let io = RetryFileIo::new();
        let tok = CancelToken::new();
        tok.cancel();

        let err = io
            .write_file(&tok, &dir.path().join("x"), b"data")
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn read_dir_reports_names_and_kinds() {
        let dir = TempDir::new().unwrap();
        let io = RetryFileIo::new();
        let tok = CancelToken::new();
        io.write_file(&tok, &dir.path().join("f.log"), b"x").unwrap();
        io.mkdir_all(&tok, &dir.path().join("sub")).unwrap();

        let mut entries = io.read_dir(&tok, dir.path()).unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "f.log");
        assert!(!entries[0].is_dir);
        assert!(entries[1].is_dir);
    }
}

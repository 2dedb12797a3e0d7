//! Error types for the Cairn substrate.
//!
//! All crates converge on the unified [`Error`] enum. We use `thiserror`
//! for `Display`/`Error` derivation.
//!
//! Every error kind maps to a numeric [`ErrorCode`]. The replication
//! tracker compares codes against [`ErrorCode::FailoverQualified`] to
//! decide whether an I/O failure warrants flipping the active/passive
//! toggler; everything at or above that threshold qualifies.
//!
//! ### Severity conventions
//!
//! - `Cache`, `LockNotAcquired`, `LockLost` are "no work" conditions for
//!   the log sweepers: callers translate them to an empty result instead
//!   of propagating.
//! - `WriteQuorumExceeded` is fatal for a blob write and doubles as the
//!   rollback signal for the transaction layer above.
//! - `FailoverQualified` wraps a host-chosen code so collaborators outside
//!   this workspace can mint qualifying errors of their own.

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for Cairn operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes.
///
/// The discriminants are part of the replication contract: any code
/// `>= FailoverQualified` triggers a failover when observed by the
/// tracker, so new kinds must be slotted deliberately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u16)]
pub enum ErrorCode {
    /// Catch-all for foreign errors.
    Unknown = 0,
    /// No erasure config for the table and no `""` fallback.
    ConfigMissing = 10,
    /// Encode/decode/reconstruct failure.
    Codec = 11,
    /// Permanent file I/O failure after retry.
    FileIo = 12,
    /// Read side found no usable shard and captured no read error.
    AllShardsUnavailable = 13,
    /// More shards failed to write than parity can absorb.
    WriteQuorumExceeded = 14,
    /// Operation aborted by its cancellation token.
    Cancelled = 15,
    /// Marshalling failure (JSON or binary).
    Serialization = 16,
    /// Structurally invalid configuration or wiring.
    InvalidConfig = 17,
    /// Shared cache operation failed.
    Cache = 20,
    /// The sweeper lock could not be acquired.
    LockNotAcquired = 21,
    /// The sweeper lock was lost mid-scan.
    LockLost = 22,
    /// Replication bookkeeping failure.
    Replication = 30,
    /// A registry file sector could not be restored during rollback.
    RestoreRegistryFileSector = 31,
    /// Threshold: this code and anything above qualifies for failover.
    FailoverQualified = 50,
}

/// Unified error type for the Cairn substrate.
#[derive(Debug, Error)]
pub enum Error {
    /// No erasure configuration exists for the table (nor a default).
    #[error("no erasure config for table {table:?} and no default entry")]
    ConfigMissing {
        /// Table whose lookup failed.
        table: String,
    },

    /// Shard codec failure (encode, verify, or reconstruct).
    #[error("shard codec failure: {0}")]
    Codec(String),

    /// Permanent file I/O failure after the retry policy was exhausted.
    #[error("file I/O failed for {path:?}: {source}")]
    FileIo {
        /// Path of the failed operation.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Every shard slot of a blob came back empty without a captured
    /// read error to surface instead.
    #[error("no shard of blob {id} is available on any drive")]
    AllShardsUnavailable {
        /// Blob whose shards were all missing.
        id: Uuid,
    },

    /// More than `parity` shard writes failed; the blob write is void.
    #[error("blob {id}: {failed} shard writes failed, parity tolerates {parity}")]
    WriteQuorumExceeded {
        /// Blob being written.
        id: Uuid,
        /// Number of failed shard writes.
        failed: usize,
        /// Parity shard count (the tolerance).
        parity: usize,
    },

    /// Operation observed a tripped cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// JSON or binary marshalling failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Structurally invalid configuration or wiring.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Shared cache failure (non-fatal at the sweeper layer).
    #[error("cache error: {0}")]
    Cache(String),

    /// The hour lock (or another cache lock) could not be taken.
    #[error("lock not acquired")]
    LockNotAcquired,

    /// The lock was lost between the scan and the hand-off re-check.
    #[error("lock lost before hand-off")]
    LockLost,

    /// Replication bookkeeping failure.
    #[error("replication error: {0}")]
    Replication(String),

    /// A registry file sector could not be restored while rolling back.
    #[error("failed restoring registry file sector: {0}")]
    RestoreRegistryFileSector(String),

    /// Host-minted error carrying an explicit failover-relevant code.
    #[error("error code {code}: {message}")]
    FailoverQualified {
        /// Numeric code; `>= 50` triggers failover when observed.
        code: u16,
        /// Human-readable context.
        message: String,
    },

    /// Raw I/O error that did not pass through the retrying layer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Numeric code for this error, per the replication contract.
    pub fn code(&self) -> u16 {
        match self {
            Error::ConfigMissing { .. } => ErrorCode::ConfigMissing as u16,
            Error::Codec(_) => ErrorCode::Codec as u16,
            Error::FileIo { .. } => ErrorCode::FileIo as u16,
            Error::AllShardsUnavailable { .. } => ErrorCode::AllShardsUnavailable as u16,
            Error::WriteQuorumExceeded { .. } => ErrorCode::WriteQuorumExceeded as u16,
            Error::Cancelled => ErrorCode::Cancelled as u16,
            Error::Serialization(_) => ErrorCode::Serialization as u16,
            Error::InvalidConfig(_) => ErrorCode::InvalidConfig as u16,
            Error::Cache(_) => ErrorCode::Cache as u16,
            Error::LockNotAcquired => ErrorCode::LockNotAcquired as u16,
            Error::LockLost => ErrorCode::LockLost as u16,
            Error::Replication(_) => ErrorCode::Replication as u16,
            Error::RestoreRegistryFileSector(_) => ErrorCode::RestoreRegistryFileSector as u16,
            Error::FailoverQualified { code, .. } => *code,
            Error::Io(_) => ErrorCode::Unknown as u16,
        }
    }

    /// Whether this error's code clears the failover threshold.
    pub fn is_failover_qualified(&self) -> bool {
        self.code() >= ErrorCode::FailoverQualified as u16
    }

    /// Whether this error is the restore-registry-sector sentinel.
    pub fn is_restore_registry_sector(&self) -> bool {
        matches!(self, Error::RestoreRegistryFileSector(_))
    }

    /// "No work available" conditions at the sweeper layer.
    pub fn is_no_work(&self) -> bool {
        matches!(
            self,
            Error::Cache(_) | Error::LockNotAcquired | Error::LockLost
        )
    }

    /// Whether this error came from a tripped cancellation token.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

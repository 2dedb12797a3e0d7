//! Active/passive replication tracking.
//!
//! Two base folders back every replicated deployment: one active, one
//! passive, selected by a single toggler bit. The tracker serialises an
//! at-most-one failover decision across processes (shared-cache mirror
//! plus an in-process mutex), persists status to `replstat.txt` on both
//! folders, appends commit-change logs while a failed target is out, and
//! fast-forwards a reinstated target from those logs.
//!
//! ## Failover ordering
//!
//! The post-failover status is persisted to the CURRENT PASSIVE folder
//! before the toggler flips, so the newly-active side owns the record:
//! a crash between the write and the flip leaves a newer status file on
//! the passive side, which init detects and converges on.

pub mod commitlog;
pub mod files;
pub mod status;
pub mod tracker;

pub use commitlog::{oldest_commit_log, read_commit_log, write_commit_log, COMMIT_LOG_FOLDER};
pub use files::{
    read_registry_hash_mod, read_store_list, write_registry_hash_mod, write_store_list,
};
pub use status::{
    process_cell, read_status_file, status_file_mtime, write_status_file, StatusCell,
    REPLICATION_STATUS_CACHE_KEY, REPLICATION_STATUS_FILE,
};
pub use tracker::{ReplicationTracker, ReplicationTrackerBuilder, ReplicationTrackerOptions};

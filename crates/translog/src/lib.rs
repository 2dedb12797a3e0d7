//! Per-transaction logs with age-gated, lock-serialised sweeping.
//!
//! Two log families live under `<active>/translogs/`:
//!
//! - [`TransactionLog`]: one newline-delimited JSON file per TID,
//!   appended through a cached handle for the TID's lifetime. A shared
//!   hour lock makes discovery single-sweeper across processes, and an
//!   age gate keeps in-flight transactions out of the sweep.
//! - [`PriorityLog`]: one bincode block per TID (`.plg`, with an
//!   optional `.bak` backup) enumerated in aged batches for expedited
//!   reprocessing.

pub mod prioritylog;
pub mod translog;

pub use prioritylog::{PriorityLog, PriorityLogOptions, PRIORITY_BATCH_DEFAULT};
pub use translog::{
    SweepItem, TransactionLog, TransactionLogOptions, HOUR_LOCK_KEY, TRANS_LOG_FOLDER,
};

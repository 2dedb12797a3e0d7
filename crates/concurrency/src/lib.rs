//! Concurrency building blocks for the Cairn substrate.
//!
//! - [`TaskRunner`]: a bounded job group used for shard fan-out. One
//!   group per blob-store operation; workers are scoped threads, results
//!   come back in job order, and a tripped cancellation token drains the
//!   remaining queue as [`Error::Cancelled`](cairn_core::Error).
//! - [`MemoryCache`]: an in-process [`L2Cache`](cairn_core::L2Cache)
//!   with TTL expiry and an all-or-nothing lock table. It backs tests
//!   and single-process deployments; multi-process deployments plug a
//!   shared cache into the same trait.

pub mod cache;
pub mod runner;

pub use cache::MemoryCache;
pub use runner::{first_error, Job, TaskRunner};

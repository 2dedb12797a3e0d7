//! Cairn: a filesystem-backed, erasure-coded, replicated storage
//! substrate.
//!
//! Blobs are Reed–Solomon split into `d + p` shards spread over `d + p`
//! drive roots, each shard file carrying a 17-byte integrity header.
//! Reads reconstruct transparently under missing or bit-rotted shards
//! and can repair the damage in place; writes tolerate up to `p` failed
//! shard files. An active/passive replication tracker serialises
//! failover across processes and fast-forwards a reinstated target from
//! commit-change logs, and per-transaction logs provide age-gated,
//! lock-serialised sweeping by a single worker.
//!
//! This crate re-exports the member crates:
//!
//! - [`core`]: shared types, the unified error, collaborator traits.
//! - [`codec`]: the shard codec and blob path mapping.
//! - [`fs`]: the default retrying file IO.
//! - [`concurrency`]: the bounded task runner and in-process cache.
//! - [`blobstore`]: the erasure-coded blob store.
//! - [`replication`]: the replication tracker.
//! - [`translog`]: transaction and priority logs.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cairn::blobstore::{BlobBatch, BlobStore, ErasureOptions, ErasureSettings};
//! use cairn::core::CancelToken;
//! use cairn::fs::RetryFileIo;
//! use uuid::Uuid;
//!
//! # fn main() -> cairn::core::Result<()> {
//! let drives = vec!["/mnt/d0".into(), "/mnt/d1".into(), "/mnt/d2".into()];
//! let store = BlobStore::builder()
//!     .file_io(Arc::new(RetryFileIo::new()))
//!     .settings(ErasureSettings::new().with_default(
//!         ErasureOptions::new(2, 1, drives).with_repair(true),
//!     ))
//!     .build()?;
//!
//! let tok = CancelToken::new();
//! let id = Uuid::new_v4();
//! store.add(&tok, &[BlobBatch {
//!     table: "events".into(),
//!     blobs: vec![(id, b"payload".to_vec())],
//! }])?;
//! let payload = store.get_one(&tok, "events", id)?;
//! assert_eq!(payload, b"payload");
//! # Ok(())
//! # }
//! ```

pub use cairn_blobstore as blobstore;
pub use cairn_codec as codec;
pub use cairn_concurrency as concurrency;
pub use cairn_core as core;
pub use cairn_fs as fs;
pub use cairn_replication as replication;
pub use cairn_translog as translog;

/// Commonly used items.
pub mod prelude {
    pub use cairn_blobstore::{BlobBatch, BlobStore, ErasureOptions, ErasureSettings};
    pub use cairn_codec::{PathMapper, ShardCodec};
    pub use cairn_concurrency::{MemoryCache, TaskRunner};
    pub use cairn_core::{
        BlobId, CancelToken, Error, ErrorCode, FileIo, L2Cache, L2CacheExt, Result, Tid,
    };
    pub use cairn_fs::RetryFileIo;
    pub use cairn_replication::{ReplicationTracker, ReplicationTrackerOptions};
    pub use cairn_translog::{PriorityLog, TransactionLog};
}

//! Shared foundation for the Cairn storage substrate.
//!
//! This crate carries the pieces every other Cairn crate agrees on:
//!
//! - The unified [`Error`] type and its numeric [`ErrorCode`]s, including
//!   the failover-qualified classification consumed by the replication
//!   tracker.
//! - Data-model types: blob and transaction identifiers, replication
//!   status, store/registry payloads, and the on-disk log record shapes.
//! - Collaborator traits ([`FileIo`], [`L2Cache`], [`StoreRepository`],
//!   [`Registry`], [`StoreCopier`]) that the core consumes but does not
//!   own. Concrete implementations live in sibling crates or in the host.
//! - [`CancelToken`], the cancellation flag threaded through every
//!   suspending operation.

pub mod cancel;
pub mod error;
pub mod traits;
pub mod types;

pub use cancel::CancelToken;
pub use error::{Error, ErrorCode, Result};
pub use traits::{
    DirEntryInfo, FileIo, L2Cache, L2CacheExt, Registry, StoreCopier, StoreRepository,
};
pub use types::{
    BlobId, CommitChangeRecord, Handle, LogRecord, RegistryPayload, ReplicationStatus, StoreInfo,
    Tid,
};

//! Erasure-coded blob store.
//!
//! Splits opaque blobs into `d + p` Reed–Solomon shards and spreads them
//! over `d + p` distinct drive roots, one shard file per drive. Reads
//! reconstruct transparently while at most `p` shards are missing or
//! bit-rotted, optionally repairing the damaged files in place; writes
//! succeed while at most `p` shard files fail to land.
//!
//! Geometry and drive roots are configured per table, with an `""` entry
//! acting as the fallback for tables without their own configuration.

pub mod config;
pub mod store;

pub use config::{ErasureOptions, ErasureSettings};
pub use store::{BlobBatch, BlobStore, BlobStoreBuilder};

//! Shard codec for the Cairn blob store.
//!
//! Translates `bytes ↔ [shard; N]` with Reed–Solomon over GF(2^8) and a
//! fixed 17-byte per-shard metadata header used for bit-rot detection:
//!
//! ```text
//! [ stuff_zero_count: u8 ][ md5(shard_bytes): 16 bytes ]
//! ```
//!
//! The header is hand-packed, never run through a serializer, because it
//! is a wire format shared with every reader of the shard files.
//!
//! Also hosts [`PathMapper`], which spreads blob files over a 4-level
//! directory fan-out so no single directory collects millions of entries.

pub mod path;
pub mod shard;

pub use path::PathMapper;
pub use shard::{DecodeOutcome, ShardCodec, ShardMetadata, METADATA_SIZE};

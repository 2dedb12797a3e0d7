//! Reed–Solomon shard codec with per-shard integrity metadata.
//!
//! Encoding splits a payload into `d` equal data shards (the tail is
//! zero-stuffed so `d` divides the padded length) and derives `p` parity
//! shards. Decoding verifies parity first, reconstructs missing shards
//! second, and falls back to a checksum sweep that identifies bit-rotted
//! shards by their MD5 digests before a final reconstruction attempt.

use cairn_core::{Error, Result};
use reed_solomon_erasure::galois_8::ReedSolomon;

/// Size of the per-shard metadata header: stuffing byte plus MD5 digest.
pub const METADATA_SIZE: usize = 17;

/// Per-shard metadata header, bit-exact on disk.
pub type ShardMetadata = [u8; METADATA_SIZE];

/// Result of a successful decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeOutcome {
    /// The reassembled payload, stuffing stripped.
    pub data: Vec<u8>,
    /// Indices of shards that had to be rebuilt (missing or bit-rotted).
    /// Empty when every shard verified on the first pass.
    pub reconstructed: Vec<usize>,
}

/// Data ↔ shard translator for one `(d, p)` geometry.
///
/// The codec owns no durable state; one instance is typically cached per
/// table by the blob store.
pub struct ShardCodec {
    data_shards: usize,
    parity_shards: usize,
    rs: ReedSolomon,
}

impl ShardCodec {
    /// Build a codec for `d` data and `p` parity shards.
    ///
    /// `d >= 1`, `p >= 1`, `d + p <= 256` (the GF(2^8) field bound).
    pub fn new(data_shards: usize, parity_shards: usize) -> Result<Self> {
        if data_shards == 0 || parity_shards == 0 {
            return Err(Error::Codec(format!(
                "invalid shard geometry: d={data_shards}, p={parity_shards}"
            )));
        }
        if data_shards + parity_shards > 256 {
            return Err(Error::Codec(format!(
                "total shards {} exceed the field limit of 256",
                data_shards + parity_shards
            )));
        }
        let rs = ReedSolomon::new(data_shards, parity_shards)
            .map_err(|e| Error::Codec(format!("reed-solomon init: {e}")))?;
        Ok(ShardCodec {
            data_shards,
            parity_shards,
            rs,
        })
    }

    /// Number of data shards.
    pub fn data_shards(&self) -> usize {
        self.data_shards
    }

    /// Number of parity shards.
    pub fn parity_shards(&self) -> usize {
        self.parity_shards
    }

    /// Total shard count `d + p`.
    pub fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }

    /// Trailing zero bytes stuffed into the last data shard for a
    /// payload of `data_len` bytes.
    pub fn stuff_count(&self, data_len: usize) -> u8 {
        ((self.data_shards - data_len % self.data_shards) % self.data_shards) as u8
    }

    /// Split `data` into `d` data shards and compute `p` parity shards.
    pub fn encode(&self, data: &[u8]) -> Result<Vec<Vec<u8>>> {
        if data.is_empty() {
            return Err(Error::Codec("cannot encode an empty payload".into()));
        }
        let stuff = self.stuff_count(data.len()) as usize;
        let shard_size = (data.len() + stuff) / self.data_shards;

        let mut shards: Vec<Vec<u8>> = Vec::with_capacity(self.total_shards());
        for i in 0..self.data_shards {
            let start = i * shard_size;
            let end = data.len().min(start + shard_size);
            let mut shard = data[start..end].to_vec();
            shard.resize(shard_size, 0);
            shards.push(shard);
        }
        for _ in 0..self.parity_shards {
            shards.push(vec![0u8; shard_size]);
        }
        self.rs
            .encode(&mut shards)
            .map_err(|e| Error::Codec(format!("parity encode: {e}")))?;
        Ok(shards)
    }

    /// Metadata header for one shard of a payload of `data_len` bytes.
    ///
    /// The stuffing byte is written into EVERY shard's header; decode
    /// reads it from the first header that survived, so any subset of
    /// headers may go missing.
    pub fn metadata(&self, data_len: usize, shard: &[u8]) -> ShardMetadata {
        let mut meta = [0u8; METADATA_SIZE];
        meta[0] = self.stuff_count(data_len);
        meta[1..].copy_from_slice(&md5::compute(shard).0);
        meta
    }

    /// Reassemble a payload from shard slots, reconstructing missing or
    /// bit-rotted shards when within parity tolerance.
    ///
    /// `shards[i]` is `None` when shard `i` could not be read; `meta[i]`
    /// likewise. Returns the payload and the set of rebuilt indices.
    pub fn decode(
        &self,
        mut shards: Vec<Option<Vec<u8>>>,
        meta: &[Option<ShardMetadata>],
    ) -> Result<DecodeOutcome> {
        if shards.is_empty() {
            return Err(Error::Codec("no shards to decode".into()));
        }
        if shards.len() != self.total_shards() {
            return Err(Error::Codec(format!(
                "expected {} shard slots, got {}",
                self.total_shards(),
                shards.len()
            )));
        }
        if shards.iter().all(|s| s.is_none()) {
            return Err(Error::Codec("every shard slot is empty".into()));
        }

        let missing: Vec<usize> = shards
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.is_none().then_some(i))
            .collect();

        // First pass: everything present and parity-consistent. A
        // verify error (e.g. a truncated shard) counts as failed here;
        // only the final pass surfaces it.
        if missing.is_empty() && self.verify_ok(&shards) {
            return self.join(&shards, meta, Vec::new());
        }

        // Second pass: rebuild the missing set and re-verify. A failure
        // here (too many missing, or surviving shards are rotted) falls
        // through to the checksum sweep on the original slots.
        let originals = shards.clone();
        if !missing.is_empty() && self.rs.reconstruct(&mut shards).is_ok() && self.verify_ok(&shards)
        {
            return self.join(&shards, meta, missing);
        }

        // Third pass: checksum sweep. Compare each originally-present
        // shard against the MD5 in its header, null out mismatches, and
        // reconstruct once more.
        let mut swept = originals;
        let mut corrupted: Vec<usize> = Vec::new();
        for (i, slot) in swept.iter_mut().enumerate() {
            let header = meta.get(i).and_then(|m| m.as_ref());
            if let (Some(shard), Some(m)) = (slot.as_ref(), header) {
                if m[1..] != md5::compute(shard).0 {
                    corrupted.push(i);
                    *slot = None;
                }
            }
        }
        if corrupted.is_empty() {
            return Err(Error::Codec(
                "final attempt failed: no checksum mismatch found to repair".into(),
            ));
        }
        self.rs
            .reconstruct(&mut swept)
            .map_err(|e| Error::Codec(format!("reconstruct after checksum sweep: {e}")))?;
        if !self.verify(&swept)? {
            return Err(Error::Codec(
                "reconstruction failed final parity verification".into(),
            ));
        }
        let mut rebuilt = missing;
        rebuilt.extend(corrupted);
        rebuilt.sort_unstable();
        rebuilt.dedup();
        self.join(&swept, meta, rebuilt)
    }

    /// Parity check that treats verification errors as a plain failure.
    fn verify_ok(&self, shards: &[Option<Vec<u8>>]) -> bool {
        self.verify(shards).unwrap_or(false)
    }

    /// Parity check over fully-populated shard slots.
    fn verify(&self, shards: &[Option<Vec<u8>>]) -> Result<bool> {
        let mut present: Vec<&[u8]> = Vec::with_capacity(shards.len());
        for slot in shards {
            match slot {
                Some(shard) => present.push(shard.as_slice()),
                None => return Ok(false),
            }
        }
        self.rs
            .verify(&present)
            .map_err(|e| Error::Codec(format!("parity verify: {e}")))
    }

    /// Concatenate the data shards and strip the stuffed tail.
    fn join(
        &self,
        shards: &[Option<Vec<u8>>],
        meta: &[Option<ShardMetadata>],
        reconstructed: Vec<usize>,
    ) -> Result<DecodeOutcome> {
        let stuff = meta
            .iter()
            .flatten()
            .next()
            .map(|m| m[0] as usize)
            .ok_or_else(|| Error::Codec("no shard metadata survived".into()))?;

        let mut data = Vec::new();
        for slot in shards.iter().take(self.data_shards) {
            let shard = slot
                .as_ref()
                .ok_or_else(|| Error::Codec("data shard missing after reconstruction".into()))?;
            data.extend_from_slice(shard);
        }
        if stuff > data.len() {
            return Err(Error::Codec(format!(
                "stuffing count {stuff} exceeds joined length {}",
                data.len()
            )));
        }
        data.truncate(data.len() - stuff);
        Ok(DecodeOutcome {
            data,
            reconstructed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta_for(codec: &ShardCodec, data_len: usize, shards: &[Vec<u8>]) -> Vec<Option<ShardMetadata>> {
        shards
            .iter()
            .map(|s| Some(codec.metadata(data_len, s)))
            .collect()
    }

    fn slots(shards: &[Vec<u8>]) -> Vec<Option<Vec<u8>>> {
        shards.iter().cloned().map(Some).collect()
    }

    #[test]
    fn round_trip_uneven_payload() {
        let codec = ShardCodec::new(2, 1).unwrap();
        let data = vec![1u8, 2, 3];
        let shards = codec.encode(&data).unwrap();
        assert_eq!(shards.len(), 3);

        let meta = meta_for(&codec, data.len(), &shards);
        let out = codec.decode(slots(&shards), &meta).unwrap();
        assert_eq!(out.data, data);
        assert!(out.reconstructed.is_empty());
    }

    #[test]
    fn stuffing_is_zero_when_divisible() {
        let codec = ShardCodec::new(4, 2).unwrap();
        assert_eq!(codec.stuff_count(8), 0);
        assert_eq!(codec.stuff_count(7), 1);
        assert_eq!(codec.stuff_count(5), 3);
    }

    #[test]
    fn metadata_layout_is_stuff_then_md5() {
        let codec = ShardCodec::new(2, 1).unwrap();
        let data = vec![9u8, 8, 7];
        let shards = codec.encode(&data).unwrap();
        let meta = codec.metadata(data.len(), &shards[0]);

        assert_eq!(meta[0], 1); // 2 - (3 % 2)
        assert_eq!(meta[1..], md5::compute(&shards[0]).0);
        assert_eq!(meta.len(), METADATA_SIZE);
    }

    #[test]
    fn decode_tolerates_missing_parity_worth_of_shards() {
        let codec = ShardCodec::new(4, 2).unwrap();
        let data: Vec<u8> = (0..41).collect();
        let shards = codec.encode(&data).unwrap();
        let meta = meta_for(&codec, data.len(), &shards);

        let mut holes = slots(&shards);
        holes[0] = None;
        holes[5] = None;
        let out = codec.decode(holes, &meta).unwrap();
        assert_eq!(out.data, data);
        assert_eq!(out.reconstructed, vec![0, 5]);
    }

    #[test]
    fn decode_fails_past_parity_tolerance() {
        let codec = ShardCodec::new(2, 1).unwrap();
        let shards = codec.encode(&[1, 2, 3]).unwrap();
        let meta = meta_for(&codec, 3, &shards);

        let mut holes = slots(&shards);
        holes[0] = None;
        holes[2] = None;
        assert!(codec.decode(holes, &meta).is_err());
    }

    #[test]
    fn bit_rot_is_found_by_checksum_sweep() {
        let codec = ShardCodec::new(4, 2).unwrap();
        let data: Vec<u8> = (0..64).map(|i| i as u8).collect();
        let shards = codec.encode(&data).unwrap();
        let meta = meta_for(&codec, data.len(), &shards);

        let mut rotted = slots(&shards);
        rotted[1].as_mut().unwrap()[3] ^= 0xFF;
        let out = codec.decode(rotted, &meta).unwrap();
        assert_eq!(out.data, data);
        assert_eq!(out.reconstructed, vec![1]);
    }

    #[test]
    fn truncated_shard_is_treated_as_corrupt() {
        let codec = ShardCodec::new(3, 2).unwrap();
        let data: Vec<u8> = (0..60).collect();
        let shards = codec.encode(&data).unwrap();
        let meta = meta_for(&codec, data.len(), &shards);

        let mut slots = slots(&shards);
        slots[2].as_mut().unwrap().truncate(5);
        let out = codec.decode(slots, &meta).unwrap();
        assert_eq!(out.data, data);
        assert_eq!(out.reconstructed, vec![2]);
    }

    #[test]
    fn stuff_byte_read_from_first_surviving_header() {
        // A legacy writer may have stamped only shard 0's header; decode
        // must work from whatever subset of headers survived.
        let codec = ShardCodec::new(2, 1).unwrap();
        let data = vec![5u8, 6, 7];
        let shards = codec.encode(&data).unwrap();
        let mut meta = meta_for(&codec, data.len(), &shards);
        meta[0] = None;
        meta[1] = None;

        let out = codec.decode(slots(&shards), &meta).unwrap();
        assert_eq!(out.data, data);
    }

    #[test]
    fn no_surviving_header_is_an_error() {
        let codec = ShardCodec::new(2, 1).unwrap();
        let shards = codec.encode(&[1, 2, 3]).unwrap();
        let meta = vec![None; 3];
        assert!(codec.decode(slots(&shards), &meta).is_err());
    }

    #[test]
    fn empty_payload_and_empty_slots_are_rejected() {
        let codec = ShardCodec::new(2, 1).unwrap();
        assert!(codec.encode(&[]).is_err());
        assert!(codec.decode(Vec::new(), &[]).is_err());
        assert!(codec.decode(vec![None, None, None], &[None, None, None]).is_err());
    }

    #[test]
    fn geometry_limits() {
        assert!(ShardCodec::new(0, 1).is_err());
        assert!(ShardCodec::new(1, 0).is_err());
        assert!(ShardCodec::new(200, 57).is_err());
        assert!(ShardCodec::new(200, 56).is_ok());
    }
}

//! Property: decode(encode(data)) == data for any payload and geometry,
//! including after parity-tolerable shard loss.

use cairn_codec::ShardCodec;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn encode_decode_round_trip(
        data in proptest::collection::vec(any::<u8>(), 1..2048),
        d in 1usize..12,
        p in 1usize..5,
    ) {
        let codec = ShardCodec::new(d, p).unwrap();
        let shards = codec.encode(&data).unwrap();
        let meta: Vec<_> = shards
            .iter()
            .map(|s| Some(codec.metadata(data.len(), s)))
            .collect();
        let slots: Vec<_> = shards.into_iter().map(Some).collect();

        let out = codec.decode(slots, &meta).unwrap();
        prop_assert_eq!(out.data, data);
        prop_assert!(out.reconstructed.is_empty());
    }

    #[test]
    fn round_trip_with_parity_worth_of_holes(
        data in proptest::collection::vec(any::<u8>(), 1..1024),
        p in 1usize..4,
        seed in any::<u64>(),
    ) {
        let d = 4usize;
        let codec = ShardCodec::new(d, p).unwrap();
        let shards = codec.encode(&data).unwrap();
        let meta: Vec<_> = shards
            .iter()
            .map(|s| Some(codec.metadata(data.len(), s)))
            .collect();
        let mut slots: Vec<_> = shards.into_iter().map(Some).collect();

        // Knock out exactly p distinct shards.
        let total = d + p;
        let mut knocked = 0usize;
        let mut cursor = seed as usize;
        while knocked < p {
            let i = cursor % total;
            cursor = cursor.wrapping_mul(6364136223846793005).wrapping_add(1);
            if slots[i].is_some() {
                slots[i] = None;
                knocked += 1;
            }
        }

        let out = codec.decode(slots, &meta).unwrap();
        prop_assert_eq!(out.data, data);
        prop_assert_eq!(out.reconstructed.len(), p);
    }
}

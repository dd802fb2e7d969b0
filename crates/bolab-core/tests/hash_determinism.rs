use std::collections::BTreeMap;

use bolab_core::{derive_substream_seed, stable_hash_string, to_canonical_json_bytes};
use serde::Serialize;

#[derive(Serialize)]
struct Forward {
    alpha: u32,
    beta: String,
    nested: BTreeMap<String, u32>,
}

#[derive(Serialize)]
struct Backward {
    nested: BTreeMap<String, u32>,
    beta: String,
    alpha: u32,
}

#[test]
fn canonical_bytes_ignore_field_order() {
    let mut nested = BTreeMap::new();
    nested.insert("z".to_string(), 1);
    nested.insert("a".to_string(), 2);
    let forward = Forward {
        alpha: 7,
        beta: "seven".to_string(),
        nested: nested.clone(),
    };
    let backward = Backward {
        nested,
        beta: "seven".to_string(),
        alpha: 7,
    };
    assert_eq!(
        to_canonical_json_bytes(&forward).expect("encode"),
        to_canonical_json_bytes(&backward).expect("encode"),
    );
}

#[test]
fn hash_is_stable_across_calls() {
    let payload = ("campaign", vec![1u64, 2, 3]);
    let first = stable_hash_string(&payload).expect("hash");
    let second = stable_hash_string(&payload).expect("hash");
    assert_eq!(first, second);
    assert_eq!(first.len(), 64);
}

#[test]
fn hash_moves_with_content() {
    let a = stable_hash_string(&("x", 1u64)).expect("hash");
    let b = stable_hash_string(&("x", 2u64)).expect("hash");
    assert_ne!(a, b);
}

#[test]
fn substreams_are_stable_and_distinct() {
    let seed = 0x5EED_u64;
    assert_eq!(
        derive_substream_seed(seed, 3),
        derive_substream_seed(seed, 3)
    );
    assert_ne!(
        derive_substream_seed(seed, 3),
        derive_substream_seed(seed, 4)
    );
    assert_ne!(
        derive_substream_seed(seed, 0),
        derive_substream_seed(seed.wrapping_add(1), 0)
    );
}

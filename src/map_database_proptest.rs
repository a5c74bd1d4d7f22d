#![cfg(test)]

// Property tests for MapDatabase kept inside the crate so they can reach
// the chain-ordering check.

use crate::database::{Database, InsertStatus};
use crate::error::DatabaseError;
use crate::map_database::{DatabaseConfig, MapDatabase};
use proptest::prelude::*;
use std::collections::HashMap;

// A small hash domain and alphabet make equal-hash/different-string pairs
// (collisions) and exact repeats (old strings) both common.
#[derive(Clone, Debug)]
enum Op {
    Insert(u64, Vec<u8>),
    InsertPrefix(u64, u64, Vec<u8>),
    Lookup(u64),
    Hold(u64),
}

fn arb_bytes() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(prop_oneof![Just(b'a'), Just(b'b'), Just(0u8)], 0..4)
}

fn arb_op() -> impl Strategy<Value = Op> {
    let hash = 0u64..48;
    prop_oneof![
        3 => (hash.clone(), arb_bytes()).prop_map(|(h, s)| Op::Insert(h, s)),
        2 => (hash.clone(), hash.clone(), arb_bytes()).prop_map(|(h, p, s)| Op::InsertPrefix(h, p, s)),
        1 => hash.clone().prop_map(Op::Lookup),
        1 => hash.prop_map(Op::Hold),
    ]
}

fn arb_config() -> impl Strategy<Value = DatabaseConfig> {
    (1usize..9, prop_oneof![Just(0.5), Just(0.75), Just(1.0), Just(3.0)]).prop_map(|(b, f)| {
        DatabaseConfig::new()
            .with_initial_buckets(b)
            .with_max_load_factor(f)
    })
}

fn expected_status(model: &mut HashMap<u64, Vec<u8>>, hash: u64, full: Vec<u8>) -> InsertStatus {
    match model.get(&hash) {
        Some(stored) if *stored == full => InsertStatus::Old,
        Some(_) => InsertStatus::Collision,
        None => {
            model.insert(hash, full);
            InsertStatus::New
        }
    }
}

// Property: State-machine equivalence against a HashMap<hash, bytes> model.
// Invariants exercised across random operation sequences:
// - `insert` reports New/Old/Collision exactly as the model predicts and
//   never overwrites a stored string.
// - `insert_prefix` behaves as lookup(prefix) ++ suffix, or reports an
//   unknown prefix without inserting.
// - Lookups match the model, including after rehashes; held slices keep
//   their content.
// - `len` parity, load factor bound, and sorted chains after each op.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine(config in arb_config(), ops in proptest::collection::vec(arb_op(), 1..80)) {
        let sut: MapDatabase<u64> = MapDatabase::with_config(config).unwrap();
        let mut model: HashMap<u64, Vec<u8>> = HashMap::new();
        let mut held: Vec<(&[u8], Vec<u8>)> = Vec::new();

        for op in ops {
            match op {
                Op::Insert(h, s) => {
                    let got = sut.insert(h, &s);
                    let want = expected_status(&mut model, h, s);
                    prop_assert_eq!(got, want);
                }
                Op::InsertPrefix(h, p, s) => {
                    let got = sut.insert_prefix(h, p, &s);
                    match model.get(&p).cloned() {
                        None => {
                            prop_assert_eq!(got, Err(DatabaseError::UnknownPrefix { prefix: p }));
                        }
                        Some(mut full) => {
                            full.extend_from_slice(&s);
                            let want = expected_status(&mut model, h, full);
                            prop_assert_eq!(got, Ok(want));
                        }
                    }
                }
                Op::Lookup(h) => {
                    prop_assert_eq!(sut.lookup(h), model.get(&h).map(Vec::as_slice));
                    if let Some(with_nul) = sut.lookup_with_nul(h) {
                        prop_assert_eq!(with_nul.last(), Some(&0u8));
                    }
                }
                Op::Hold(h) => {
                    if let Some(bytes) = sut.lookup(h) {
                        held.push((bytes, bytes.to_vec()));
                    }
                }
            }

            for (slice, copy) in &held {
                prop_assert_eq!(*slice, copy.as_slice());
            }
            prop_assert_eq!(sut.len(), model.len());
            prop_assert!(sut.load_factor() <= config.max_load_factor);
            prop_assert!(sut.bucket_count() >= config.initial_buckets);
            sut.assert_chains_sorted();
        }
    }
}

// Property: every distinct-hash insertion stays retrievable verbatim.
proptest! {
    #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]
    #[test]
    fn prop_distinct_hashes_round_trip(
        entries in proptest::collection::hash_map(any::<u32>(), "[ -~]{0,12}", 0..200),
    ) {
        let sut: MapDatabase<u32> = MapDatabase::with_config(
            DatabaseConfig::new().with_initial_buckets(1),
        ).unwrap();
        for (h, s) in &entries {
            prop_assert_eq!(sut.insert(*h, s.as_bytes()), InsertStatus::New);
        }
        for (h, s) in &entries {
            prop_assert_eq!(sut.lookup_str(*h), Some(s.as_str()));
            prop_assert_eq!(sut.insert(*h, s.as_bytes()), InsertStatus::Old);
        }
        prop_assert_eq!(sut.len(), entries.len());
    }
}

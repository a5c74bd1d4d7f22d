// MapDatabase integration suite.
//
// Each test documents what behavior is being verified. The core
// invariants exercised:
// - Retrieval: every inserted (hash, string) pair with a unique hash is
//   retrievable byte for byte, across any number of rehashes.
// - Status: same pair twice is New then Old; a different string under a
//   taken hash is Collision and leaves the stored string alone.
// - Growth: bucket count doubles, never drops below its start, and keeps
//   len / bucket_count <= max_load_factor.
// - Stability: slices returned by lookup keep address and content.
use string_id::{Database, DatabaseConfig, DatabaseError, HashValue, InsertStatus, MapDatabase};

fn database(buckets: usize, factor: f64) -> MapDatabase<u64> {
    MapDatabase::with_config(
        DatabaseConfig::new()
            .with_initial_buckets(buckets)
            .with_max_load_factor(factor),
    )
    .expect("valid config")
}

// Test: end-to-end growth from a tiny table.
// Verifies: 1000 distinct precomputed hashes all resolve to their strings
// and the table doubled its way to at least 1024 buckets.
#[test]
fn thousand_strings_from_four_buckets() {
    let db = database(4, 1.0);
    let strings: Vec<String> = (0..1000).map(|i| format!("string number {i}")).collect();
    let hashes: Vec<u64> = strings.iter().map(|s| u64::fnv1a(s.as_bytes())).collect();

    for (h, s) in hashes.iter().zip(&strings) {
        assert_eq!(db.insert(*h, s.as_bytes()), InsertStatus::New);
        assert!(db.load_factor() <= 1.0);
    }
    assert_eq!(db.len(), 1000);
    assert!(db.bucket_count() >= 1024);
    assert!(db.bucket_count().is_power_of_two());
    for (h, s) in hashes.iter().zip(&strings) {
        assert_eq!(db.lookup_str(*h), Some(s.as_str()));
    }
}

// Test: duplicate and collision outcomes.
// Verifies: item count grows once; the original string survives a collision.
#[test]
fn status_sequence() {
    let db = database(16, 1.0);
    assert_eq!(db.insert(99, b"alpha"), InsertStatus::New);
    assert_eq!(db.insert(99, b"alpha"), InsertStatus::Old);
    assert_eq!(db.len(), 1);
    assert_eq!(db.insert(99, b"beta"), InsertStatus::Collision);
    assert_eq!(db.len(), 1);
    assert_eq!(db.lookup(99), Some(&b"alpha"[..]));
}

// Test: prefix insertion is indistinguishable from inserting the whole string.
// Verifies: same bytes, same status, same hash when hashing by extension.
#[test]
fn prefix_insert_equals_full_insert() {
    let with_prefix = database(8, 1.0);
    let plain = database(8, 1.0);
    let prefix = with_prefix.intern(b"session/").unwrap();
    plain.intern(b"session/").unwrap();

    for suffix in ["", "a", "user-17", "with\0nul"] {
        let hash = prefix.fnv1a_extend(suffix.as_bytes());
        let full = format!("session/{suffix}");
        assert_eq!(hash, u64::fnv1a(full.as_bytes()));

        let a = with_prefix.insert_prefix(hash, prefix, suffix.as_bytes()).unwrap();
        let b = plain.insert(hash, full.as_bytes());
        assert_eq!(a, b);
        assert_eq!(with_prefix.lookup_with_nul(hash), plain.lookup_with_nul(hash));
    }
}

// Test: intern helpers surface collisions as errors.
// Verifies: the error names both strings and the shared hash.
#[test]
fn intern_collision_error() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let db = database(8, 1.0);
    let hash = u64::fnv1a(b"genuine");
    assert_eq!(db.insert(hash, b"forged"), InsertStatus::New);
    let err = db.intern(b"genuine").unwrap_err();
    assert_eq!(
        err,
        DatabaseError::Collision {
            hash,
            existing: "forged".to_string(),
            candidate: "genuine".to_string(),
        }
    );
    let msg = err.to_string();
    assert!(msg.contains("forged") && msg.contains("genuine"), "{msg}");
}

// Test: lookup stability across growth.
// Verifies: slices taken early keep their address and bytes after the
// table has grown several times.
#[test]
fn early_lookups_survive_growth() {
    let db = database(1, 0.5);
    let mut early = Vec::new();
    for i in 0u64..8 {
        db.insert(i << 40, format!("early-{i}").as_bytes());
        let s = db.lookup(i << 40).unwrap();
        early.push((i, s, s.as_ptr()));
    }
    let before = db.bucket_count();
    for i in 0u64..5000 {
        db.insert(i, i.to_string().as_bytes());
    }
    assert!(db.bucket_count() >= 4 * before);
    for (i, s, ptr) in early {
        assert_eq!(s, format!("early-{i}").as_bytes());
        assert_eq!(db.lookup(i << 40).unwrap().as_ptr(), ptr);
    }
}

// Test: 32-bit ids behave the same as 64-bit ones.
#[test]
fn narrow_hashes() {
    let db: MapDatabase<u32> = MapDatabase::new();
    let a = db.intern(b"left").unwrap();
    let b = db.intern(b"right").unwrap();
    assert_ne!(a, b);
    assert_eq!(db.lookup_str(a), Some("left"));
    assert_eq!(db.lookup_str(b), Some("right"));
    assert_eq!(db.intern_prefixed(a, b"-hand"), Ok(u32::fnv1a(b"left-hand")));
}

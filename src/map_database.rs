//! MapDatabase: hash-verified string storage with sorted bucket chains.
//!
//! Nodes live in a `SlotMap` arena and never leave it. Each bucket holds
//! the head of a singly linked chain threaded through arena keys and
//! ordered by strictly increasing hash. A node's bytes are a separate
//! heap buffer (content plus a `0` terminator) owned by the node; rehashing
//! only relinks chains, so slices handed out by `lookup` stay valid until
//! the database is dropped.

use crate::database::{Database, InsertStatus, StableLookup};
use crate::error::DatabaseError;
use crate::hash::HashValue;
use core::cell::{Cell, UnsafeCell};
use core::fmt;
use core::marker::PhantomData;
use core::ptr::NonNull;
use slotmap::{DefaultKey, SlotMap};

const GROWTH_FACTOR: usize = 2;

/// Smallest accepted `max_load_factor`. Below it, the first insert into a
/// small table would need an unbounded number of doublings before the
/// growth threshold reaches 2.
pub const MIN_LOAD_FACTOR: f64 = 1.0 / 65536.0;

/// Construction parameters for [`MapDatabase`].
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(default))]
pub struct DatabaseConfig {
    /// Number of buckets allocated up front.
    pub initial_buckets: usize,
    /// Upper bound on `len / bucket_count` after every insertion.
    pub max_load_factor: f64,
}

impl DatabaseConfig {
    pub fn new() -> Self {
        Self {
            initial_buckets: 1024,
            max_load_factor: 1.0,
        }
    }

    pub fn with_initial_buckets(mut self, buckets: usize) -> Self {
        self.initial_buckets = buckets;
        self
    }

    pub fn with_max_load_factor(mut self, factor: f64) -> Self {
        self.max_load_factor = factor;
        self
    }

    pub fn validate(&self) -> Result<(), DatabaseError> {
        if self.initial_buckets == 0 {
            return Err(DatabaseError::InvalidBucketCount(self.initial_buckets));
        }
        if !self.max_load_factor.is_finite() || self.max_load_factor < MIN_LOAD_FACTOR {
            return Err(DatabaseError::InvalidLoadFactor(self.max_load_factor));
        }
        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::new()
    }
}

struct Node<H> {
    hash: H,
    next: Option<DefaultKey>,
    // Content followed by a 0 terminator; freed in `Drop`.
    bytes: NonNull<[u8]>,
}

// Safety: the node uniquely owns its byte buffer.
unsafe impl<H: Send> Send for Node<H> {}

impl<H> Node<H> {
    /// Allocate a node holding the concatenation of `parts` plus terminator.
    fn new(hash: H, next: Option<DefaultKey>, parts: &[&[u8]]) -> Self {
        let len: usize = parts.iter().map(|p| p.len()).sum();
        let mut buf = Vec::with_capacity(len + 1);
        for part in parts {
            buf.extend_from_slice(part);
        }
        buf.push(0);
        let raw = Box::into_raw(buf.into_boxed_slice());
        Node {
            hash,
            next,
            // Safety: `Box::into_raw` never returns null.
            bytes: unsafe { NonNull::new_unchecked(raw) },
        }
    }

    #[inline]
    fn with_nul(&self) -> &[u8] {
        // Safety: the buffer is live and never written after construction.
        unsafe { self.bytes.as_ref() }
    }

    #[inline]
    fn content(&self) -> &[u8] {
        let b = self.with_nul();
        &b[..b.len() - 1]
    }
}

impl<H> Drop for Node<H> {
    fn drop(&mut self) {
        // Safety: produced by `Box::into_raw` in `Node::new`, dropped once.
        unsafe { drop(Box::from_raw(self.bytes.as_ptr())) };
    }
}

enum Position {
    Occupied(DefaultKey),
    Vacant { prev: Option<DefaultKey> },
}

struct Table<H> {
    nodes: SlotMap<DefaultKey, Node<H>>,
    buckets: Box<[Option<DefaultKey>]>,
    max_load_factor: f64,
    next_resize: usize,
}

fn resize_threshold(buckets: usize, max_load_factor: f64) -> usize {
    (buckets as f64 * max_load_factor).floor() as usize
}

impl<H: HashValue> Table<H> {
    fn new(config: DatabaseConfig) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            buckets: vec![None; config.initial_buckets].into_boxed_slice(),
            max_load_factor: config.max_load_factor,
            next_resize: resize_threshold(config.initial_buckets, config.max_load_factor),
        }
    }

    fn find(&self, hash: H) -> Option<DefaultKey> {
        let mut cur = self.buckets[hash.bucket(self.buckets.len())];
        while let Some(key) = cur {
            let node = &self.nodes[key];
            if node.hash >= hash {
                return (node.hash == hash).then_some(key);
            }
            cur = node.next;
        }
        None
    }

    /// Where `hash` sits in its bucket chain.
    fn position(&self, bucket: usize, hash: H) -> Position {
        let mut prev = None;
        let mut cur = self.buckets[bucket];
        while let Some(key) = cur {
            let node = &self.nodes[key];
            if node.hash == hash {
                return Position::Occupied(key);
            }
            if node.hash > hash {
                break;
            }
            prev = Some(key);
            cur = node.next;
        }
        Position::Vacant { prev }
    }

    fn successor(&self, bucket: usize, prev: Option<DefaultKey>) -> Option<DefaultKey> {
        match prev {
            Some(p) => self.nodes[p].next,
            None => self.buckets[bucket],
        }
    }

    fn link(&mut self, bucket: usize, prev: Option<DefaultKey>, node: Node<H>) {
        let key = self.nodes.insert(node);
        match prev {
            Some(p) => self.nodes[p].next = Some(key),
            None => self.buckets[bucket] = Some(key),
        }
    }

    /// Grow until one more item keeps the load factor in bounds.
    fn reserve_one(&mut self) {
        while self.nodes.len() + 1 >= self.next_resize {
            self.rehash();
        }
    }

    fn rehash(&mut self) {
        let new_count = GROWTH_FACTOR * self.buckets.len();
        let old = std::mem::replace(&mut self.buckets, vec![None; new_count].into_boxed_slice());
        let mut tails: Vec<Option<DefaultKey>> = vec![None; new_count];

        // Every destination bucket is fed by a single source chain, which is
        // already sorted, so appending at the tail keeps chains sorted.
        for &head in old.iter() {
            let mut cur = head;
            while let Some(key) = cur {
                let node = &mut self.nodes[key];
                cur = node.next.take();
                let hash = node.hash;
                let dest = hash.bucket(new_count);
                match tails[dest] {
                    Some(tail) => {
                        debug_assert!(self.nodes[tail].hash < hash);
                        self.nodes[tail].next = Some(key);
                    }
                    None => self.buckets[dest] = Some(key),
                }
                tails[dest] = Some(key);
            }
        }

        self.next_resize = resize_threshold(new_count, self.max_load_factor);
        tracing::debug!(
            from = old.len(),
            to = new_count,
            items = self.nodes.len(),
            "string id database rehashed"
        );
    }
}

/// The string-id database backed by a growable hash table.
///
/// Not `Sync`: wrap it in [`ThreadSafeDatabase`](crate::ThreadSafeDatabase)
/// to share it between threads.
pub struct MapDatabase<H: HashValue = u64> {
    table: UnsafeCell<Table<H>>,
    // `Send` but never `Sync`: the table is mutated through `&self`.
    _not_sync: PhantomData<Cell<()>>,
}

impl<H: HashValue> MapDatabase<H> {
    /// 1024 buckets with a maximum load factor of 1.0.
    pub fn new() -> Self {
        Self::from_valid(DatabaseConfig::default())
    }

    pub fn with_config(config: DatabaseConfig) -> Result<Self, DatabaseError> {
        config.validate()?;
        Ok(Self::from_valid(config))
    }

    fn from_valid(config: DatabaseConfig) -> Self {
        Self {
            table: UnsafeCell::new(Table::new(config)),
            _not_sync: PhantomData,
        }
    }

    #[inline]
    fn with_table<R>(&self, f: impl FnOnce(&Table<H>) -> R) -> R {
        // Safety: `Self` is `!Sync`, and no closure passed here or to
        // `with_table_mut` calls back into the database, so no `&mut Table`
        // is live.
        f(unsafe { &*self.table.get() })
    }

    #[inline]
    fn with_table_mut<R>(&self, f: impl FnOnce(&mut Table<H>) -> R) -> R {
        // Safety: as in `with_table`. Outstanding lookup slices point into
        // node buffers, which the table never touches after creation.
        f(unsafe { &mut *self.table.get() })
    }

    pub fn len(&self) -> usize {
        self.with_table(|t| t.nodes.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.with_table(|t| t.buckets.len())
    }

    pub fn max_load_factor(&self) -> f64 {
        self.with_table(|t| t.max_load_factor)
    }

    pub fn load_factor(&self) -> f64 {
        self.with_table(|t| t.nodes.len() as f64 / t.buckets.len() as f64)
    }

    /// Entries in bucket order, each chain by increasing hash.
    ///
    /// Takes `&mut self` so no insert can run while the iterator is alive.
    pub fn iter(&mut self) -> Iter<'_, H> {
        let table = self.table.get_mut();
        Iter {
            table,
            bucket: 0,
            cur: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn assert_chains_sorted(&self) {
        self.with_table(|t| {
            for (i, &head) in t.buckets.iter().enumerate() {
                let mut prev: Option<H> = None;
                let mut cur = head;
                while let Some(key) = cur {
                    let node = &t.nodes[key];
                    assert_eq!(node.hash.bucket(t.buckets.len()), i, "node in wrong bucket");
                    if let Some(p) = prev {
                        assert!(p < node.hash, "chain not strictly increasing");
                    }
                    prev = Some(node.hash);
                    cur = node.next;
                }
            }
        });
    }
}

impl<H: HashValue> Default for MapDatabase<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: HashValue> fmt::Debug for MapDatabase<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_table(|t| {
            f.debug_struct("MapDatabase")
                .field("len", &t.nodes.len())
                .field("buckets", &t.buckets.len())
                .field("max_load_factor", &t.max_load_factor)
                .finish()
        })
    }
}

impl<H: HashValue> Database<H> for MapDatabase<H> {
    fn insert(&self, hash: H, bytes: &[u8]) -> InsertStatus {
        self.with_table_mut(|t| {
            t.reserve_one();
            let bucket = hash.bucket(t.buckets.len());
            match t.position(bucket, hash) {
                Position::Occupied(key) if t.nodes[key].content() == bytes => InsertStatus::Old,
                Position::Occupied(_) => InsertStatus::Collision,
                Position::Vacant { prev } => {
                    let node = Node::new(hash, t.successor(bucket, prev), &[bytes]);
                    t.link(bucket, prev, node);
                    InsertStatus::New
                }
            }
        })
    }

    fn insert_prefix(&self, hash: H, prefix: H, suffix: &[u8]) -> Result<InsertStatus, DatabaseError> {
        self.with_table_mut(|t| -> Result<InsertStatus, DatabaseError> {
            t.reserve_one();
            let bucket = hash.bucket(t.buckets.len());
            let position = t.position(bucket, hash);
            let prefix_key = t
                .find(prefix)
                .ok_or(DatabaseError::UnknownPrefix { prefix: prefix.to_u64() })?;
            let head = t.nodes[prefix_key].content();
            match position {
                Position::Occupied(key) => {
                    let stored = t.nodes[key].content();
                    let same = stored.len() == head.len() + suffix.len()
                        && stored.starts_with(head)
                        && &stored[head.len()..] == suffix;
                    Ok(if same { InsertStatus::Old } else { InsertStatus::Collision })
                }
                Position::Vacant { prev } => {
                    let node = Node::new(hash, t.successor(bucket, prev), &[head, suffix]);
                    t.link(bucket, prev, node);
                    Ok(InsertStatus::New)
                }
            }
        })
    }

    fn lookup_with_nul(&self, hash: H) -> Option<&[u8]> {
        self.with_table(|t| {
            t.find(hash).map(|key| {
                let bytes = t.nodes[key].bytes;
                // Safety: node buffers outlive `self` (`StableLookup`).
                unsafe { &*bytes.as_ptr() }
            })
        })
    }
}

// Safety: node buffers are allocated once, never written afterwards, and
// only freed when the table is dropped.
unsafe impl<H: HashValue> StableLookup<H> for MapDatabase<H> {}

/// Iterator over `(hash, bytes)` pairs of a [`MapDatabase`].
pub struct Iter<'a, H> {
    table: &'a Table<H>,
    bucket: usize,
    cur: Option<DefaultKey>,
}

impl<'a, H: HashValue> Iterator for Iter<'a, H> {
    type Item = (H, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        while self.cur.is_none() {
            if self.bucket == self.table.buckets.len() {
                return None;
            }
            self.cur = self.table.buckets[self.bucket];
            self.bucket += 1;
        }
        let key = self.cur?;
        let table = self.table;
        let node = &table.nodes[key];
        self.cur = node.next;
        Some((node.hash, node.content()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.table.nodes.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small(buckets: usize, factor: f64) -> MapDatabase<u64> {
        MapDatabase::with_config(
            DatabaseConfig::new()
                .with_initial_buckets(buckets)
                .with_max_load_factor(factor),
        )
        .unwrap()
    }

    /// Invariant: re-inserting the same pair reports `Old` and does not grow the table.
    #[test]
    fn new_then_old() {
        let db = MapDatabase::<u64>::new();
        assert_eq!(db.insert(42, b"answer"), InsertStatus::New);
        assert_eq!(db.insert(42, b"answer"), InsertStatus::Old);
        assert_eq!(db.len(), 1);
        assert_eq!(db.lookup(42), Some(&b"answer"[..]));
    }

    /// Invariant: a different string under a taken hash is a collision and the
    /// stored string is left untouched.
    #[test]
    fn collision_keeps_original() {
        let db = MapDatabase::<u32>::new();
        assert_eq!(db.insert(7, b"first"), InsertStatus::New);
        assert_eq!(db.insert(7, b"second"), InsertStatus::Collision);
        assert_eq!(db.insert(7, b"firs"), InsertStatus::Collision);
        assert_eq!(db.insert(7, b"first!"), InsertStatus::Collision);
        assert_eq!(db.len(), 1);
        assert_eq!(db.lookup_str(7), Some("first"));
    }

    #[test]
    fn empty_string_is_storable() {
        let db = MapDatabase::<u64>::new();
        assert_eq!(db.insert(0, b""), InsertStatus::New);
        assert_eq!(db.insert(0, b""), InsertStatus::Old);
        assert_eq!(db.insert(0, b"x"), InsertStatus::Collision);
        assert_eq!(db.lookup_with_nul(0), Some(&b"\0"[..]));
        assert_eq!(db.lookup(0), Some(&b""[..]));
    }

    /// Invariant: stored bytes are followed by a terminator, and interior
    /// nul bytes are kept verbatim.
    #[test]
    fn terminator_and_interior_nul() {
        let db = MapDatabase::<u64>::new();
        db.insert(1, b"a\0b");
        assert_eq!(db.lookup_with_nul(1), Some(&b"a\0b\0"[..]));
        assert_eq!(db.lookup(1), Some(&b"a\0b"[..]));
        assert!(db.lookup_cstr(1).is_none());
    }

    #[test]
    fn lookup_of_unknown_hash_is_none() {
        let db = small(4, 1.0);
        assert!(db.lookup(3).is_none());
        db.insert(7, b"seven");
        db.insert(3 + 4 * 10, b"same bucket, larger hash");
        assert!(db.lookup(3).is_none());
        assert!(db.lookup(11).is_none());
    }

    /// Invariant: `insert_prefix` stores the same bytes and reports the same
    /// status as inserting the concatenation.
    #[test]
    fn insert_prefix_matches_plain_insert() {
        let a = MapDatabase::<u64>::new();
        let b = MapDatabase::<u64>::new();
        a.insert(1, b"net_");
        b.insert(1, b"net_");

        assert_eq!(a.insert_prefix(2, 1, b"eth0"), Ok(InsertStatus::New));
        assert_eq!(b.insert(2, b"net_eth0"), InsertStatus::New);
        assert_eq!(a.lookup_with_nul(2), b.lookup_with_nul(2));

        assert_eq!(a.insert_prefix(2, 1, b"eth0"), Ok(InsertStatus::Old));
        assert_eq!(a.insert(2, b"net_eth0"), InsertStatus::Old);
        assert_eq!(a.insert_prefix(2, 1, b"eth1"), Ok(InsertStatus::Collision));
        assert_eq!(a.insert_prefix(2, 1, b"eth"), Ok(InsertStatus::Collision));
        assert_eq!(a.insert_prefix(2, 1, b"eth00"), Ok(InsertStatus::Collision));
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn insert_prefix_with_empty_parts() {
        let db = MapDatabase::<u64>::new();
        db.insert(1, b"");
        assert_eq!(db.insert_prefix(2, 1, b"tail"), Ok(InsertStatus::New));
        assert_eq!(db.lookup(2), Some(&b"tail"[..]));
        assert_eq!(db.insert_prefix(3, 2, b""), Ok(InsertStatus::New));
        assert_eq!(db.lookup(3), Some(&b"tail"[..]));
    }

    /// Invariant: a missing prefix is reported and nothing is inserted.
    #[test]
    fn insert_prefix_requires_prefix() {
        let db = MapDatabase::<u64>::new();
        assert_eq!(
            db.insert_prefix(2, 1, b"x"),
            Err(DatabaseError::UnknownPrefix { prefix: 1 })
        );
        assert!(db.is_empty());
        assert!(db.lookup(2).is_none());
    }

    /// Invariant: `len / bucket_count <= max_load_factor` after every insertion,
    /// and chains stay sorted and correctly bucketed across rehashes.
    #[test]
    fn growth_keeps_load_factor_bounded() {
        let db = small(4, 0.75);
        for h in 0u64..500 {
            let hash = h.wrapping_mul(0x9e37_79b9_7f4a_7c15);
            assert_eq!(db.insert(hash, format!("s{h}").as_bytes()), InsertStatus::New);
            assert!(db.load_factor() <= 0.75, "load factor {} too high", db.load_factor());
            assert!(db.bucket_count() >= 4);
        }
        db.assert_chains_sorted();
        assert_eq!(db.len(), 500);
    }

    /// Invariant: a load factor so small that one doubling is not enough still
    /// holds after insertion.
    #[test]
    fn tiny_load_factor_grows_repeatedly() {
        let db = small(4, 0.01);
        db.insert(1, b"one");
        assert!(db.load_factor() <= 0.01);
        assert!(db.bucket_count() >= 200);
        assert!(db.bucket_count().is_power_of_two());
    }

    /// Invariant: slices returned by lookup keep their address and content
    /// across rehashes triggered by later inserts.
    #[test]
    fn lookups_survive_rehash() {
        let db = small(2, 1.0);
        db.insert(10, b"ten");
        let before = db.lookup(10).unwrap();
        let ptr = before.as_ptr();
        let buckets = db.bucket_count();
        for h in 100..1100u64 {
            db.insert(h, h.to_string().as_bytes());
        }
        assert!(db.bucket_count() > buckets);
        assert_eq!(before, b"ten");
        assert_eq!(db.lookup(10).unwrap().as_ptr(), ptr);
    }

    /// Invariant: many hashes sharing one bucket stay sorted whatever the insert order.
    #[test]
    fn same_bucket_chain_is_sorted() {
        let db = small(8, 1000.0);
        for h in [40u64, 8, 24, 0, 56, 16, 32, 48] {
            db.insert(h, h.to_string().as_bytes());
        }
        assert_eq!(db.bucket_count(), 8);
        db.assert_chains_sorted();
        for h in (0..64).step_by(8) {
            assert_eq!(db.lookup_str(h), Some(h.to_string().as_str()));
        }
    }

    #[test]
    fn iter_yields_every_entry_once() {
        let mut db = small(4, 1.0);
        for h in 0u64..50 {
            db.insert(h * 3, format!("v{h}").as_bytes());
        }
        let mut seen: Vec<(u64, Vec<u8>)> = db.iter().map(|(h, b)| (h, b.to_vec())).collect();
        seen.sort();
        let expected: Vec<(u64, Vec<u8>)> =
            (0u64..50).map(|h| (h * 3, format!("v{h}").into_bytes())).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn config_validation() {
        assert!(matches!(
            MapDatabase::<u64>::with_config(DatabaseConfig::new().with_initial_buckets(0)),
            Err(DatabaseError::InvalidBucketCount(0))
        ));
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY, MIN_LOAD_FACTOR / 2.0] {
            assert!(matches!(
                MapDatabase::<u64>::with_config(DatabaseConfig::new().with_max_load_factor(bad)),
                Err(DatabaseError::InvalidLoadFactor(_))
            ));
        }
        let db = MapDatabase::<u64>::new();
        assert_eq!(db.bucket_count(), 1024);
        assert_eq!(db.max_load_factor(), 1.0);
    }

    /// Invariant: the database can move to another thread.
    #[test]
    fn database_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<MapDatabase<u64>>();
        assert_send::<MapDatabase<u32>>();
    }

    /// Invariant: a load factor the table could never satisfy is rejected
    /// up front instead of growing without bound on the first insert.
    #[test]
    fn vanishing_load_factor_is_rejected() {
        let config = DatabaseConfig::new()
            .with_initial_buckets(4)
            .with_max_load_factor(1e-300);
        assert_eq!(config.validate(), Err(DatabaseError::InvalidLoadFactor(1e-300)));
        assert!(matches!(
            MapDatabase::<u64>::with_config(config),
            Err(DatabaseError::InvalidLoadFactor(f)) if f == 1e-300
        ));
    }

    /// Invariant: the smallest accepted load factor still reaches a bounded
    /// table on the first insert.
    #[test]
    fn minimum_load_factor_grows_once_to_fit() {
        let db = small(4, MIN_LOAD_FACTOR);
        assert_eq!(db.insert(1, b"x"), InsertStatus::New);
        assert!(db.load_factor() <= MIN_LOAD_FACTOR);
        assert_eq!(db.bucket_count(), 1 << 17);
        assert_eq!(db.lookup(1), Some(&b"x"[..]));
    }
}

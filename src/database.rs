//! The capability set shared by every string-id database.

use crate::error::DatabaseError;
use crate::hash::HashValue;
use core::ffi::CStr;

/// Outcome of inserting a (hash, string) pair.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum InsertStatus {
    /// No entry existed for the hash; one was created.
    New,
    /// An entry existed and holds the same string.
    Old,
    /// An entry existed and holds a different string.
    Collision,
}

impl InsertStatus {
    pub fn is_new(self) -> bool {
        self == InsertStatus::New
    }

    pub fn is_collision(self) -> bool {
        self == InsertStatus::Collision
    }
}

/// A store mapping hash values back to the strings that produced them.
///
/// Every operation takes `&self`: stores either serialize internally
/// (`ThreadSafeDatabase`) or are `!Sync` and never call back into
/// themselves while the table is borrowed (`MapDatabase`). Slices returned by lookups borrow from the store, so a
/// store that hands them out across later inserts must not move the bytes
/// (see [`StableLookup`]).
pub trait Database<H: HashValue> {
    /// Store a copy of `bytes` under `hash` unless an entry already exists.
    fn insert(&self, hash: H, bytes: &[u8]) -> InsertStatus;

    /// Store `lookup(prefix) ++ suffix` under `hash`.
    ///
    /// The default looks the prefix up and concatenates; stores override it
    /// to avoid building the full string.
    fn insert_prefix(&self, hash: H, prefix: H, suffix: &[u8]) -> Result<InsertStatus, DatabaseError> {
        let mut full = self
            .lookup(prefix)
            .ok_or(DatabaseError::UnknownPrefix { prefix: prefix.to_u64() })?
            .to_vec();
        full.extend_from_slice(suffix);
        Ok(self.insert(hash, &full))
    }

    /// The stored bytes for `hash` followed by a `0` terminator.
    ///
    /// Returns `None` if `hash` was never inserted.
    fn lookup_with_nul(&self, hash: H) -> Option<&[u8]>;

    /// The stored bytes for `hash`, without terminator.
    fn lookup(&self, hash: H) -> Option<&[u8]> {
        self.lookup_with_nul(hash)
            .map(|b| b.split_last().map_or(b, |(_, rest)| rest))
    }

    /// The stored string for `hash`, if it is valid UTF-8.
    fn lookup_str(&self, hash: H) -> Option<&str> {
        self.lookup(hash).and_then(|b| core::str::from_utf8(b).ok())
    }

    /// The stored string for `hash` as a C string.
    ///
    /// Returns `None` if `hash` is unknown or the bytes contain a `0`.
    fn lookup_cstr(&self, hash: H) -> Option<&CStr> {
        self.lookup_with_nul(hash)
            .and_then(|b| CStr::from_bytes_with_nul(b).ok())
    }

    /// Hash `bytes` with FNV-1a and insert them, treating a collision as an error.
    fn intern(&self, bytes: &[u8]) -> Result<H, DatabaseError> {
        let hash = H::fnv1a(bytes);
        match self.insert(hash, bytes) {
            InsertStatus::Collision => Err(collision_error(self, hash, bytes.to_vec())),
            _ => Ok(hash),
        }
    }

    /// Intern `lookup(prefix) ++ suffix`, hashing by extending `prefix`.
    fn intern_prefixed(&self, prefix: H, suffix: &[u8]) -> Result<H, DatabaseError> {
        let hash = prefix.fnv1a_extend(suffix);
        match self.insert_prefix(hash, prefix, suffix)? {
            InsertStatus::Collision => {
                let mut candidate = self.lookup(prefix).unwrap_or_default().to_vec();
                candidate.extend_from_slice(suffix);
                Err(collision_error(self, hash, candidate))
            }
            _ => Ok(hash),
        }
    }
}

fn collision_error<H, D>(db: &D, hash: H, candidate: Vec<u8>) -> DatabaseError
where
    H: HashValue,
    D: Database<H> + ?Sized,
{
    let existing = String::from_utf8_lossy(db.lookup(hash).unwrap_or_default()).into_owned();
    let candidate = String::from_utf8_lossy(&candidate).into_owned();
    tracing::warn!(hash = hash.to_u64(), %existing, %candidate, "string id collision");
    DatabaseError::Collision { hash: hash.to_u64(), existing, candidate }
}

/// Marker for stores whose lookup results never move or change while the
/// store is alive, even across later inserts.
///
/// # Safety
///
/// For every `hash`, once `lookup_with_nul(hash)` returned `Some(bytes)`,
/// the memory behind `bytes` must stay allocated and unmodified until the
/// store is dropped. `ThreadSafeDatabase` relies on this to return slices
/// after releasing its lock.
pub unsafe trait StableLookup<H: HashValue>: Database<H> {}

//! string-id: fixed-width hash ids for strings, verified against a
//! database that detects collisions and maps ids back to their strings.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: cheap, comparable string handles (the FNV-1a hash of the
//!   string) without ever silently confusing two strings that share a hash.
//! - Layers:
//!   - `Database<H>`: capability trait (insert, prefix insert, lookup) with
//!     a generic `insert_prefix` built on lookup + insert.
//!   - `MapDatabase<H>`: the engine. Nodes in a `slotmap` arena, one sorted
//!     singly linked chain per bucket, grow-before-insert rehashing that
//!     relinks nodes instead of copying them.
//!   - `ThreadSafeDatabase<D>`: one `parking_lot::Mutex` around any stable
//!     database.
//!   - `NullDatabase<H>`: stores nothing, for builds without verification.
//!   - `generator`: counter and random id generators plus the retry
//!     protocol they run against the insert status.
//!
//! Constraints
//! - Entries are never removed or updated; the table never shrinks.
//! - `MapDatabase` is `Send` but `!Sync`; share it through
//!   `ThreadSafeDatabase`.
//! - The database trusts the caller's hash and never recomputes it.
//!
//! Insert status
//! - `New`: no entry existed; one was created.
//! - `Old`: the same string was inserted before. Not an error.
//! - `Collision`: another string owns the hash. The database only reports
//!   it; callers decide. `Database::intern` turns it into
//!   `DatabaseError::Collision`.
//!
//! Lookup stability
//! - Every node owns one heap buffer (bytes + `0` terminator) that is
//!   written once and freed only when the database is dropped. Rehashing
//!   moves arena keys between chains, never buffers, so slices returned by
//!   lookups stay valid across later inserts. Stores that guarantee this
//!   implement the unsafe `StableLookup` marker, which is what lets
//!   `ThreadSafeDatabase` return slices after dropping its lock.
//!
//! Preconditions
//! - Looking up a hash that was never inserted returns `None`, and prefix
//!   insertion with an unknown prefix returns
//!   `DatabaseError::UnknownPrefix`. Both are checked; the engine walks the
//!   chain anyway.
//!
//! Notes and non-goals
//! - No removal, no iteration order guarantees beyond "bucket by bucket".
//! - Allocation failure aborts, as everywhere in `std`.

pub mod database;
pub mod error;
pub mod generator;
pub mod hash;
pub mod map_database;
mod map_database_proptest;
pub mod null_database;
pub mod thread_safe;

// Public surface
pub use database::{Database, InsertStatus, StableLookup};
pub use error::{DatabaseError, GenerationError};
pub use generator::{
    BoundedRetry, CharacterTable, CounterGenerator, Generated, RandomGenerator, RetryDecision,
    RetryPolicy,
};
pub use hash::HashValue;
pub use map_database::{DatabaseConfig, MapDatabase, MIN_LOAD_FACTOR};
pub use null_database::NullDatabase;
pub use thread_safe::ThreadSafeDatabase;

/// The database used when the caller does not pick one: 64-bit ids in a
/// lock-protected hash table.
pub type DefaultDatabase = ThreadSafeDatabase<MapDatabase<u64>, u64>;

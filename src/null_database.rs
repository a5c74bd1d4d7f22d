//! NullDatabase: a store that stores nothing.

use crate::database::{Database, InsertStatus, StableLookup};
use crate::error::DatabaseError;
use crate::hash::HashValue;
use core::marker::PhantomData;

/// Returned by every [`NullDatabase`] lookup.
pub const DISABLED_SENTINEL: &str = "string_id database disabled";

const SENTINEL_WITH_NUL: &[u8] = b"string_id database disabled\0";

/// A database for builds that do not want verification.
///
/// Every insert reports [`InsertStatus::New`], so collisions go unnoticed,
/// and every lookup returns [`DISABLED_SENTINEL`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDatabase<H = u64> {
    _hash: PhantomData<fn() -> H>,
}

impl<H> NullDatabase<H> {
    pub const fn new() -> Self {
        Self { _hash: PhantomData }
    }
}

impl<H: HashValue> Database<H> for NullDatabase<H> {
    fn insert(&self, _hash: H, _bytes: &[u8]) -> InsertStatus {
        InsertStatus::New
    }

    fn insert_prefix(&self, _hash: H, _prefix: H, _suffix: &[u8]) -> Result<InsertStatus, DatabaseError> {
        Ok(InsertStatus::New)
    }

    fn lookup_with_nul(&self, _hash: H) -> Option<&[u8]> {
        Some(SENTINEL_WITH_NUL)
    }
}

// Safety: the sentinel is `'static`.
unsafe impl<H: HashValue> StableLookup<H> for NullDatabase<H> {}

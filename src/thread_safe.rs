//! ThreadSafeDatabase: one lock around any stable database.

use crate::database::{Database, InsertStatus, StableLookup};
use crate::error::DatabaseError;
use crate::hash::HashValue;
use core::marker::PhantomData;
use parking_lot::Mutex;

/// Serializes every operation of the wrapped database behind a single
/// `parking_lot::Mutex`.
///
/// Lookups take the lock as well; there is no reader/writer split. The
/// returned slices outlive the lock, which is sound because `D` is
/// [`StableLookup`].
pub struct ThreadSafeDatabase<D, H = u64> {
    inner: Mutex<D>,
    _hash: PhantomData<fn() -> H>,
}

impl<D, H> ThreadSafeDatabase<D, H>
where
    D: StableLookup<H>,
    H: HashValue,
{
    pub fn new(inner: D) -> Self {
        Self {
            inner: Mutex::new(inner),
            _hash: PhantomData,
        }
    }

    pub fn into_inner(self) -> D {
        self.inner.into_inner()
    }

    /// Exclusive access without locking.
    pub fn get_mut(&mut self) -> &mut D {
        self.inner.get_mut()
    }

    /// Run `f` on the wrapped database while holding the lock.
    pub fn with_locked<R>(&self, f: impl FnOnce(&D) -> R) -> R {
        f(&self.inner.lock())
    }
}

impl<D, H> Default for ThreadSafeDatabase<D, H>
where
    D: StableLookup<H> + Default,
    H: HashValue,
{
    fn default() -> Self {
        Self::new(D::default())
    }
}

impl<D, H> Database<H> for ThreadSafeDatabase<D, H>
where
    D: StableLookup<H>,
    H: HashValue,
{
    fn insert(&self, hash: H, bytes: &[u8]) -> InsertStatus {
        self.inner.lock().insert(hash, bytes)
    }

    fn insert_prefix(&self, hash: H, prefix: H, suffix: &[u8]) -> Result<InsertStatus, DatabaseError> {
        self.inner.lock().insert_prefix(hash, prefix, suffix)
    }

    fn lookup_with_nul(&self, hash: H) -> Option<&[u8]> {
        let guard = self.inner.lock();
        let bytes = guard.lookup_with_nul(hash)?;
        // Safety: `D: StableLookup` keeps `bytes` valid and unchanged for as
        // long as the wrapped database, which `self` owns.
        Some(unsafe { core::slice::from_raw_parts(bytes.as_ptr(), bytes.len()) })
    }
}

// Safety: forwards to a `StableLookup` database owned for `self`'s lifetime.
unsafe impl<D, H> StableLookup<H> for ThreadSafeDatabase<D, H>
where
    D: StableLookup<H>,
    H: HashValue,
{
}

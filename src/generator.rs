//! Candidate generators and the retry protocol they follow.
//!
//! A generator appends a suffix derived from its own state to a prefix that
//! is already stored in the database, and inserts the result with
//! `insert_prefix`. While the database reports anything but
//! [`InsertStatus::New`], the generator asks its [`RetryPolicy`] whether to
//! advance its state and try again, or to accept the existing id as is.

use crate::database::{Database, InsertStatus};
use crate::error::GenerationError;
use crate::hash::HashValue;
use core::sync::atomic::{AtomicU64, Ordering};
use rand::Rng;

/// Attempts allowed by [`BoundedRetry::default`].
pub const DEFAULT_MAX_ATTEMPTS: usize = 8;

/// Digits kept at most by a fixed-width [`CounterGenerator`].
pub const MAX_COUNTER_WIDTH: usize = 32;

const COUNTER_GENERATOR: &str = "string_id::counter_generator";
const RANDOM_GENERATOR: &str = "string_id::random_generator";

/// What a generator does after a non-new insert.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RetryDecision {
    /// Advance the generator state and insert the next candidate.
    Retry,
    /// Stop and return the existing id unchanged.
    Accept,
}

/// Decides how a generator reacts to a duplicate or colliding candidate.
///
/// `attempt` starts at 1 for the first non-new result. `string` is the
/// string currently stored under `hash`.
pub trait RetryPolicy<H> {
    fn on_duplicate(
        &self,
        attempt: usize,
        generator: &'static str,
        hash: H,
        string: &[u8],
        status: InsertStatus,
    ) -> Result<RetryDecision, GenerationError>;
}

impl<H, F> RetryPolicy<H> for F
where
    F: Fn(usize, &'static str, H, &[u8], InsertStatus) -> Result<RetryDecision, GenerationError>,
{
    fn on_duplicate(
        &self,
        attempt: usize,
        generator: &'static str,
        hash: H,
        string: &[u8],
        status: InsertStatus,
    ) -> Result<RetryDecision, GenerationError> {
        self(attempt, generator, hash, string, status)
    }
}

/// Retry until `max_attempts` duplicates were seen, then fail.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BoundedRetry {
    pub max_attempts: usize,
}

impl BoundedRetry {
    pub fn new(max_attempts: usize) -> Self {
        Self { max_attempts }
    }
}

impl Default for BoundedRetry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl<H> RetryPolicy<H> for BoundedRetry {
    fn on_duplicate(
        &self,
        attempt: usize,
        generator: &'static str,
        _hash: H,
        _string: &[u8],
        _status: InsertStatus,
    ) -> Result<RetryDecision, GenerationError> {
        if attempt >= self.max_attempts {
            return Err(GenerationError::Exhausted {
                generator,
                attempts: attempt,
            });
        }
        Ok(RetryDecision::Retry)
    }
}

/// An id produced by a generator.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Generated<H> {
    pub hash: H,
    /// `New` unless the retry policy accepted an existing id.
    pub status: InsertStatus,
}

fn try_generate<H, D, P>(
    db: &D,
    prefix: H,
    generator: &'static str,
    policy: &P,
    mut candidate: impl FnMut(&mut Vec<u8>),
) -> Result<Generated<H>, GenerationError>
where
    H: HashValue,
    D: Database<H> + ?Sized,
    P: RetryPolicy<H> + ?Sized,
{
    let mut suffix = Vec::new();
    let mut attempt = 0;
    loop {
        suffix.clear();
        candidate(&mut suffix);
        let hash = prefix.fnv1a_extend(&suffix);
        let status = db.insert_prefix(hash, prefix, &suffix)?;
        if status.is_new() {
            return Ok(Generated { hash, status });
        }

        attempt += 1;
        let string = db.lookup(hash).unwrap_or_default();
        if status.is_collision() {
            tracing::warn!(
                generator,
                attempt,
                hash = hash.to_u64(),
                existing = %String::from_utf8_lossy(string),
                "generated string id collides"
            );
        } else {
            tracing::debug!(
                generator,
                attempt,
                hash = hash.to_u64(),
                "generated string id already exists"
            );
        }

        match policy.on_duplicate(attempt, generator, hash, string, status)? {
            RetryDecision::Retry => continue,
            RetryDecision::Accept => return Ok(Generated { hash, status }),
        }
    }
}

fn write_counter(out: &mut Vec<u8>, value: u64, width: usize) {
    let digits = value.to_string();
    let digits = digits.as_bytes();
    if width == 0 {
        out.extend_from_slice(digits);
    } else if digits.len() < width {
        out.resize(out.len() + width - digits.len(), b'0');
        out.extend_from_slice(digits);
    } else {
        out.extend_from_slice(&digits[digits.len() - width..]);
    }
}

/// Generates `prefix` followed by a decimal counter.
///
/// The counter is atomic, so one generator may be shared between threads
/// when the database is [`ThreadSafeDatabase`](crate::ThreadSafeDatabase).
pub struct CounterGenerator<'db, D: ?Sized, H = u64, P = BoundedRetry> {
    db: &'db D,
    prefix: H,
    counter: AtomicU64,
    width: usize,
    policy: P,
}

impl<'db, D, H> CounterGenerator<'db, D, H>
where
    D: Database<H> + ?Sized,
    H: HashValue,
{
    /// `prefix` must already be stored in `db`.
    pub fn new(db: &'db D, prefix: H) -> Self {
        Self {
            db,
            prefix,
            counter: AtomicU64::new(0),
            width: 0,
            policy: BoundedRetry::default(),
        }
    }
}

impl<'db, D, H, P> CounterGenerator<'db, D, H, P>
where
    D: Database<H> + ?Sized,
    H: HashValue,
    P: RetryPolicy<H>,
{
    pub fn with_start(self, start: u64) -> Self {
        self.counter.store(start, Ordering::Relaxed);
        self
    }

    /// Zero-pad shorter numbers to `width` digits and keep only the lowest
    /// `width` digits of longer ones. `0` means unrestricted; widths above
    /// [`MAX_COUNTER_WIDTH`] are clamped.
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width.min(MAX_COUNTER_WIDTH);
        self
    }

    pub fn with_policy<Q: RetryPolicy<H>>(self, policy: Q) -> CounterGenerator<'db, D, H, Q> {
        CounterGenerator {
            db: self.db,
            prefix: self.prefix,
            counter: self.counter,
            width: self.width,
            policy,
        }
    }

    pub fn generate(&self) -> Result<Generated<H>, GenerationError> {
        try_generate(self.db, self.prefix, COUNTER_GENERATOR, &self.policy, |out| {
            let value = self.counter.fetch_add(1, Ordering::Relaxed);
            write_counter(out, value, self.width);
        })
    }

    /// Skip `n` counter values.
    pub fn discard(&self, n: u64) {
        self.counter.fetch_add(n, Ordering::Relaxed);
    }
}

/// Characters a [`RandomGenerator`] draws from.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CharacterTable {
    chars: &'static [u8],
}

const ALNUM: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

impl CharacterTable {
    /// `None` if `chars` is empty.
    pub const fn new(chars: &'static [u8]) -> Option<Self> {
        if chars.is_empty() {
            None
        } else {
            Some(Self { chars })
        }
    }

    /// English letters of both cases and the ten digits.
    pub const fn alnum() -> Self {
        Self { chars: ALNUM }
    }

    /// English letters of both cases.
    pub fn alpha() -> Self {
        Self {
            chars: &ALNUM[..52],
        }
    }

    pub fn chars(&self) -> &'static [u8] {
        self.chars
    }
}

impl Default for CharacterTable {
    fn default() -> Self {
        Self::alnum()
    }
}

/// Generates `prefix` followed by `length` random characters.
pub struct RandomGenerator<'db, D: ?Sized, R, H = u64, P = BoundedRetry> {
    db: &'db D,
    prefix: H,
    rng: R,
    table: CharacterTable,
    length: usize,
    policy: P,
}

impl<'db, D, R, H> RandomGenerator<'db, D, R, H>
where
    D: Database<H> + ?Sized,
    R: Rng,
    H: HashValue,
{
    /// `prefix` must already be stored in `db`.
    pub fn new(db: &'db D, prefix: H, rng: R, length: usize) -> Self {
        Self {
            db,
            prefix,
            rng,
            table: CharacterTable::default(),
            length,
            policy: BoundedRetry::default(),
        }
    }
}

impl<'db, D, R, H, P> RandomGenerator<'db, D, R, H, P>
where
    D: Database<H> + ?Sized,
    R: Rng,
    H: HashValue,
    P: RetryPolicy<H>,
{
    pub fn with_table(mut self, table: CharacterTable) -> Self {
        self.table = table;
        self
    }

    pub fn with_policy<Q: RetryPolicy<H>>(self, policy: Q) -> RandomGenerator<'db, D, R, H, Q> {
        RandomGenerator {
            db: self.db,
            prefix: self.prefix,
            rng: self.rng,
            table: self.table,
            length: self.length,
            policy,
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn generate(&mut self) -> Result<Generated<H>, GenerationError> {
        let Self {
            db,
            prefix,
            rng,
            table,
            length,
            policy,
        } = self;
        try_generate(*db, *prefix, RANDOM_GENERATOR, &*policy, |out| {
            let chars = table.chars();
            out.extend((0..*length).map(|_| chars[rng.gen_range(0..chars.len())]));
        })
    }

    /// Advance the random number generator by `n` draws.
    pub fn discard(&mut self, n: u64) {
        for _ in 0..n {
            self.rng.next_u64();
        }
    }
}

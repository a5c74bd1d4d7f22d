//! Error types returned by databases and generators.

/// Errors reported by a database or its configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DatabaseError {
    /// A table must start with at least one bucket.
    #[error("invalid bucket count: {0}")]
    InvalidBucketCount(usize),
    /// The maximum load factor must be finite and strictly positive.
    #[error("invalid max load factor: {0}")]
    InvalidLoadFactor(f64),
    /// `insert_prefix` referenced a prefix hash that was never inserted.
    #[error("prefix hash {prefix:#x} was never inserted")]
    UnknownPrefix {
        /// Hash of the missing prefix.
        prefix: u64,
    },
    /// Two different strings produced the same hash.
    #[error("strings \"{existing}\" and \"{candidate}\" are both producing the value {hash:#x}")]
    Collision {
        /// The shared hash value.
        hash: u64,
        /// The string already stored under `hash`.
        existing: String,
        /// The string that was rejected.
        candidate: String,
    },
}

/// Errors reported by candidate generators.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    /// The retry policy gave up before a fresh id was produced.
    #[error("generator \"{generator}\" was unable to generate a new string id after {attempts} attempts")]
    Exhausted {
        /// Name of the generator that gave up.
        generator: &'static str,
        /// Number of duplicate results seen.
        attempts: usize,
    },
    /// The database rejected the generator's prefix.
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Errors from world-state operations.
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    /// Keys must be non-empty.
    #[error("world-state key must not be empty")]
    EmptyKey,

    /// An empty value is indistinguishable from absence; use delete instead.
    #[error("cannot store an empty value under {0}")]
    EmptyValue(String),

    /// Range bounds are inverted.
    #[error("invalid range: start {start:?} is after end {end:?}")]
    InvalidRange { start: String, end: String },

    /// A writer panicked while holding the state lock.
    #[error("world-state lock poisoned")]
    LockPoisoned,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

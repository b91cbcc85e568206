use crate::error::StoreResult;

/// A single buffered write: `Some(bytes)` stores, `None` deletes.
pub type StateWrite = (String, Option<Vec<u8>>);

/// Key/value world state held by one replica.
///
/// All implementations must satisfy these invariants:
/// - A key is either absent or maps to a non-empty value; there is no
///   tombstone or soft-deleted state.
/// - Range scans return entries in byte-lexicographic key order.
/// - A range scan observes a single consistent snapshot.
/// - [`WorldState::apply_batch`] is atomic with respect to readers.
/// - The store never interprets values; it is a pure key-value store.
pub trait WorldState: Send + Sync {
    /// Read the value stored under `key`.
    fn get_state(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value.
    fn put_state(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Remove `key`. Returns `true` if it was present.
    fn delete_state(&self, key: &str) -> StoreResult<bool>;

    /// Entries with `start <= key < end`, in key order. An empty `start` or
    /// `end` leaves that side unbounded, so `("", "")` scans everything.
    fn get_state_by_range(&self, start: &str, end: &str) -> StoreResult<Vec<(String, Vec<u8>)>>;

    /// Apply a batch of writes atomically.
    fn apply_batch(&self, writes: &[StateWrite]) -> StoreResult<()>;

    /// Number of keys currently present.
    fn len(&self) -> StoreResult<usize>;

    /// Returns `true` if no keys are present.
    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

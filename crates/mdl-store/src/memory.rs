use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{StoreError, StoreResult};
use crate::traits::{StateWrite, WorldState};

/// In-memory, ordered world state.
///
/// Entries live in a `BTreeMap` behind a `RwLock`, so range scans come out in
/// key order and every scan holds one read guard for its whole duration.
pub struct InMemoryWorldState {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryWorldState {
    /// Create a new empty world state.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Total bytes across all stored values.
    pub fn total_bytes(&self) -> StoreResult<u64> {
        Ok(self.read()?.values().map(|v| v.len() as u64).sum())
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.entries.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.entries.write().map_err(|_| StoreError::LockPoisoned)
    }
}

impl Default for InMemoryWorldState {
    fn default() -> Self {
        Self::new()
    }
}

fn check_write(key: &str, value: Option<&[u8]>) -> StoreResult<()> {
    if key.is_empty() {
        return Err(StoreError::EmptyKey);
    }
    if matches!(value, Some(v) if v.is_empty()) {
        return Err(StoreError::EmptyValue(key.to_string()));
    }
    Ok(())
}

impl WorldState for InMemoryWorldState {
    fn get_state(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.read()?.get(key).cloned())
    }

    fn put_state(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        check_write(key, Some(value))?;
        self.write()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete_state(&self, key: &str) -> StoreResult<bool> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        Ok(self.write()?.remove(key).is_some())
    }

    fn get_state_by_range(&self, start: &str, end: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
        if !start.is_empty() && !end.is_empty() && start > end {
            return Err(StoreError::InvalidRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        let lower = if start.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Included(start)
        };
        let upper = if end.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(end)
        };

        let entries = self.read()?;
        Ok(entries
            .range::<str, _>((lower, upper))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn apply_batch(&self, writes: &[StateWrite]) -> StoreResult<()> {
        for (key, value) in writes {
            check_write(key, value.as_deref())?;
        }
        let mut entries = self.write()?;
        for (key, value) in writes {
            match value {
                Some(bytes) => {
                    entries.insert(key.clone(), bytes.clone());
                }
                None => {
                    entries.remove(key);
                }
            }
        }
        tracing::trace!(writes = writes.len(), "world-state batch applied");
        Ok(())
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.read()?.len())
    }
}

impl std::fmt::Debug for InMemoryWorldState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.entries.read().map(|e| e.len()).unwrap_or_default();
        f.debug_struct("InMemoryWorldState")
            .field("key_count", &count)
            .finish()
    }
}

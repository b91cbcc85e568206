use std::collections::BTreeMap;

use mdl_crypto::{ContentHasher, Digest};
use mdl_store::{StateWrite, StoreError, WorldState};

use crate::error::ContractResult;

/// Execution context for one transition on one replica.
///
/// Reads go to the replica's committed state; writes are buffered into a
/// [`WriteSet`] and only reach the state when the replica set commits.
/// A transition therefore does not observe its own writes.
pub struct TxContext<'a> {
    state: &'a dyn WorldState,
    writes: BTreeMap<String, Option<Vec<u8>>>,
}

impl<'a> TxContext<'a> {
    pub fn new(state: &'a dyn WorldState) -> Self {
        Self {
            state,
            writes: BTreeMap::new(),
        }
    }

    pub fn get_state(&self, key: &str) -> ContractResult<Option<Vec<u8>>> {
        Ok(self.state.get_state(key)?)
    }

    /// Buffer a write. Empty values are rejected; use [`Self::delete_state`].
    pub fn put_state(&mut self, key: &str, value: Vec<u8>) -> ContractResult<()> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey.into());
        }
        if value.is_empty() {
            return Err(StoreError::EmptyValue(key.to_string()).into());
        }
        self.writes.insert(key.to_string(), Some(value));
        Ok(())
    }

    pub fn delete_state(&mut self, key: &str) -> ContractResult<()> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey.into());
        }
        self.writes.insert(key.to_string(), None);
        Ok(())
    }

    /// Committed entries with `start <= key < end`; empty bounds are open.
    pub fn get_state_by_range(&self, start: &str, end: &str) -> ContractResult<Vec<(String, Vec<u8>)>> {
        Ok(self.state.get_state_by_range(start, end)?)
    }

    pub fn into_write_set(self) -> WriteSet {
        WriteSet {
            entries: self.writes,
        }
    }
}

/// Buffered writes of one transition, ordered by key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteSet {
    entries: BTreeMap<String, Option<Vec<u8>>>,
}

impl WriteSet {
    /// Digest over the ordered entries; equal on every honest replica.
    pub fn digest(&self) -> Digest {
        ContentHasher::WRITE_SET.hash_entries(
            self.entries
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_deref())),
        )
    }

    pub fn to_batch(&self) -> Vec<StateWrite> {
        self.entries
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<Option<&[u8]>> {
        self.entries.get(key).map(|value| value.as_deref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

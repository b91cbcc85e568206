use std::sync::Arc;

use mdl_crypto::{ContentHasher, Digest};
use mdl_store::{InMemoryWorldState, StateWrite, WorldState};
use mdl_types::{ArgumentList, OperationName};

use crate::context::{TxContext, WriteSet};
use crate::contract::AssetContract;
use crate::error::ContractResult;
use crate::registry::{OperationRegistry, TxPayload};

/// The outcome of simulating one transition on one replica.
#[derive(Clone, Debug)]
pub struct Endorsement {
    pub replica: String,
    pub payload: TxPayload,
    pub write_set: WriteSet,
    pub write_set_digest: Digest,
}

/// One copy of the world state plus the contract that mutates it.
pub struct Replica {
    name: String,
    state: Arc<dyn WorldState>,
    contract: AssetContract,
    registry: Arc<OperationRegistry>,
}

impl Replica {
    pub fn new(
        name: impl Into<String>,
        state: Arc<dyn WorldState>,
        registry: Arc<OperationRegistry>,
    ) -> Self {
        Self {
            name: name.into(),
            state,
            contract: AssetContract,
            registry,
        }
    }

    pub fn in_memory(name: impl Into<String>, registry: Arc<OperationRegistry>) -> Self {
        Self::new(name, Arc::new(InMemoryWorldState::new()), registry)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &dyn WorldState {
        self.state.as_ref()
    }

    /// Execute a transition against committed state without applying it.
    pub fn simulate(
        &self,
        operation: OperationName,
        args: &ArgumentList,
    ) -> ContractResult<Endorsement> {
        let mut ctx = TxContext::new(self.state.as_ref());
        let payload = self
            .registry
            .invoke(&self.contract, &mut ctx, operation, args)?;
        let write_set = ctx.into_write_set();
        let write_set_digest = write_set.digest();
        Ok(Endorsement {
            replica: self.name.clone(),
            payload,
            write_set,
            write_set_digest,
        })
    }

    pub fn commit(&self, write_set: &WriteSet) -> ContractResult<()> {
        if write_set.is_empty() {
            return Ok(());
        }
        self.state.apply_batch(&write_set.to_batch())?;
        Ok(())
    }

    /// The committed values of every key `write_set` touches, as a batch
    /// that puts them back.
    pub fn pre_images(&self, write_set: &WriteSet) -> ContractResult<Vec<StateWrite>> {
        write_set
            .keys()
            .map(|key| Ok((key.to_string(), self.state.get_state(key)?)))
            .collect()
    }

    pub fn restore(&self, pre_images: &[StateWrite]) -> ContractResult<()> {
        if pre_images.is_empty() {
            return Ok(());
        }
        self.state.apply_batch(pre_images)?;
        Ok(())
    }

    /// Digest of the full world state in key order.
    pub fn state_digest(&self) -> ContractResult<Digest> {
        let entries = self.state.get_state_by_range("", "")?;
        Ok(ContentHasher::WORLD_STATE.hash_entries(
            entries
                .iter()
                .map(|(key, value)| (key.as_str(), Some(value.as_slice()))),
        ))
    }
}

impl std::fmt::Debug for Replica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replica").field("name", &self.name).finish()
    }
}

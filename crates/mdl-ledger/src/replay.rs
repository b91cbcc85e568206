use std::sync::Arc;

use mdl_crypto::Digest;

use crate::error::{ContractError, ContractResult};
use crate::network::{CommittedTx, ReplicaSet};
use crate::registry::OperationRegistry;
use crate::replica::Replica;

/// Result of replaying a commit history into a fresh world state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayResult {
    pub applied: u64,
    pub state_digest: Digest,
}

/// Deterministic replay of committed transitions.
pub struct ReplayEngine;

impl ReplayEngine {
    /// Re-execute `history` from genesis on an empty replica.
    ///
    /// Every step must reproduce the write-set digest recorded at commit.
    pub fn replay_from_genesis(
        registry: Arc<OperationRegistry>,
        history: &[CommittedTx],
    ) -> ContractResult<ReplayResult> {
        let replica = Replica::in_memory("replay", registry);
        let mut applied = 0u64;

        for tx in history {
            let endorsement = replica
                .simulate(tx.operation, &tx.arguments)
                .map_err(|_| ContractError::ReplayDivergence { height: tx.height })?;
            if endorsement.write_set_digest != tx.write_set_digest {
                return Err(ContractError::ReplayDivergence { height: tx.height });
            }
            replica.commit(&endorsement.write_set)?;
            applied += 1;
        }

        Ok(ReplayResult {
            applied,
            state_digest: replica.state_digest()?,
        })
    }

    /// Whether every replica's state equals a replay of the history.
    pub fn verify_convergence(set: &ReplicaSet) -> ContractResult<bool> {
        let history = set.history()?;
        let replayed = Self::replay_from_genesis(Arc::clone(set.registry()), &history)?;
        Ok(set
            .state_digests()?
            .iter()
            .all(|(_, digest)| *digest == replayed.state_digest))
    }
}

#[cfg(test)]
mod tests {
    use mdl_store::WorldState;
    use mdl_types::{ArgumentList, NamedArguments, OperationName, TenantId};
    use serde_json::json;

    use super::*;

    fn populated() -> ReplicaSet {
        let set = ReplicaSet::in_memory(&["peer0.org1", "peer0.org2"]).unwrap();
        let org = TenantId::new("Org1MSP").unwrap();
        for id in ["i1", "i2", "i3"] {
            let args = OperationName::CreateInsuranceAsset
                .bind(
                    &NamedArguments::new()
                        .with("id", id)
                        .with("patientId", "p1")
                        .with("paymentId", "pay1")
                        .with("status", "pending"),
                )
                .unwrap();
            set.submit(&org, OperationName::CreateInsuranceAsset, &args)
                .unwrap();
        }
        set.submit(
            &org,
            OperationName::TransferAsset,
            &ArgumentList::from_values(vec![json!("i2"), json!("Org2MSP")]),
        )
        .unwrap();
        set.submit(
            &org,
            OperationName::DeleteAsset,
            &ArgumentList::from_values(vec![json!("i3")]),
        )
        .unwrap();
        set
    }

    #[test]
    fn replay_reproduces_replica_state() {
        let set = populated();
        let result =
            ReplayEngine::replay_from_genesis(Arc::clone(set.registry()), &set.history().unwrap())
                .unwrap();
        assert_eq!(result.applied, 5);
        assert_eq!(result.state_digest, set.replica(0).unwrap().state_digest().unwrap());
        assert!(ReplayEngine::verify_convergence(&set).unwrap());
    }

    #[test]
    fn out_of_band_write_breaks_convergence() {
        let set = populated();
        set.replica(1)
            .unwrap()
            .state()
            .put_state("rogue", b"1")
            .unwrap();
        assert!(!ReplayEngine::verify_convergence(&set).unwrap());
    }

    #[test]
    fn tampered_history_diverges() {
        let set = populated();
        let mut history = set.history().unwrap();
        history.swap(0, 3);
        assert!(matches!(
            ReplayEngine::replay_from_genesis(Arc::clone(set.registry()), &history),
            Err(ContractError::ReplayDivergence { .. })
        ));
    }
}

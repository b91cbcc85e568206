use std::sync::{Arc, Mutex};

use mdl_crypto::Digest;
use mdl_store::StateWrite;
use mdl_types::{ArgumentList, OperationName, TenantId};

use crate::error::{ContractError, ContractResult};
use crate::registry::{OperationRegistry, TxPayload};
use crate::replica::{Endorsement, Replica};

/// A transition that every replica endorsed and committed.
#[derive(Clone, Debug, PartialEq)]
pub struct CommittedTx {
    pub height: u64,
    pub submitter: TenantId,
    pub operation: OperationName,
    pub arguments: ArgumentList,
    pub write_set_digest: Digest,
}

/// Returned to the submitter once a transition is committed.
#[derive(Clone, Debug, PartialEq)]
pub struct TxReceipt {
    pub height: u64,
    pub operation: OperationName,
    pub write_set_digest: Digest,
    pub payload: TxPayload,
}

#[derive(Default)]
struct CommitLog {
    height: u64,
    entries: Vec<CommittedTx>,
}

/// The set of replicas that hold the ledger.
///
/// Submissions are simulated on every replica and committed only when all
/// of them produce the same write set. Submission is serialized by a commit
/// lock, so two transitions that race on the same key are ordered and the
/// second observes the first. Evaluations read one replica's committed state
/// and never take the lock.
pub struct ReplicaSet {
    replicas: Vec<Replica>,
    registry: Arc<OperationRegistry>,
    log: Mutex<CommitLog>,
}

impl ReplicaSet {
    pub fn new(replicas: Vec<Replica>, registry: Arc<OperationRegistry>) -> ContractResult<Self> {
        if replicas.is_empty() {
            return Err(ContractError::NoReplicas);
        }
        Ok(Self {
            replicas,
            registry,
            log: Mutex::new(CommitLog::default()),
        })
    }

    /// One in-memory replica per name, all using the standard registry.
    pub fn in_memory<S: AsRef<str>>(names: &[S]) -> ContractResult<Self> {
        let registry = Arc::new(OperationRegistry::standard());
        let replicas = names
            .iter()
            .map(|name| Replica::in_memory(name.as_ref(), Arc::clone(&registry)))
            .collect();
        Self::new(replicas, registry)
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    pub fn replica(&self, index: usize) -> ContractResult<&Replica> {
        self.replicas
            .get(index)
            .ok_or(ContractError::UnknownReplica(index))
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.replicas.iter().position(|r| r.name() == name)
    }

    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    /// Run a read-only transition on one replica.
    pub fn evaluate(
        &self,
        replica: usize,
        operation: OperationName,
        args: &ArgumentList,
    ) -> ContractResult<TxPayload> {
        if operation.is_mutating() {
            return Err(ContractError::NotReadOnly(operation));
        }
        let endorsement = self.replica(replica)?.simulate(operation, args)?;
        Ok(endorsement.payload)
    }

    /// Endorse a transition on every replica, then commit it everywhere.
    pub fn submit(
        &self,
        submitter: &TenantId,
        operation: OperationName,
        args: &ArgumentList,
    ) -> ContractResult<TxReceipt> {
        let mut log = self.log.lock().map_err(|_| ContractError::LockPoisoned)?;

        let outcomes: Vec<ContractResult<Endorsement>> = self
            .replicas
            .iter()
            .map(|replica| replica.simulate(operation, args))
            .collect();
        let endorsement = agree(operation, &self.replicas, outcomes)?;

        let pre_images = self
            .replicas
            .iter()
            .map(|replica| replica.pre_images(&endorsement.write_set))
            .collect::<ContractResult<Vec<_>>>()?;
        for (index, replica) in self.replicas.iter().enumerate() {
            if let Err(err) = replica.commit(&endorsement.write_set) {
                tracing::error!(replica = replica.name(), error = %err, "commit failed after endorsement");
                roll_back(&self.replicas[..index], &pre_images);
                return Err(err);
            }
        }

        log.height += 1;
        let height = log.height;
        log.entries.push(CommittedTx {
            height,
            submitter: submitter.clone(),
            operation,
            arguments: args.clone(),
            write_set_digest: endorsement.write_set_digest,
        });

        tracing::info!(
            height,
            tenant = %submitter,
            operation = %operation,
            writes = endorsement.write_set.len(),
            digest = %endorsement.write_set_digest.short_hex(),
            "transition committed"
        );

        Ok(TxReceipt {
            height,
            operation,
            write_set_digest: endorsement.write_set_digest,
            payload: endorsement.payload,
        })
    }

    /// Committed transitions in order.
    pub fn history(&self) -> ContractResult<Vec<CommittedTx>> {
        let log = self.log.lock().map_err(|_| ContractError::LockPoisoned)?;
        Ok(log.entries.clone())
    }

    pub fn height(&self) -> ContractResult<u64> {
        let log = self.log.lock().map_err(|_| ContractError::LockPoisoned)?;
        Ok(log.height)
    }

    /// World-state digest of every replica, by name.
    pub fn state_digests(&self) -> ContractResult<Vec<(String, Digest)>> {
        self.replicas
            .iter()
            .map(|r| Ok((r.name().to_string(), r.state_digest()?)))
            .collect()
    }
}

/// Undo a partially committed transition on the replicas that took it.
fn roll_back(committed: &[Replica], pre_images: &[Vec<StateWrite>]) {
    for (replica, batch) in committed.iter().zip(pre_images).rev() {
        match replica.restore(batch) {
            Ok(()) => tracing::warn!(replica = replica.name(), "partial commit rolled back"),
            Err(err) => tracing::error!(
                replica = replica.name(),
                error = %err,
                "rollback failed; replica has diverged"
            ),
        }
    }
}

/// All replicas must agree: either the same write set or the same error.
fn agree(
    operation: OperationName,
    replicas: &[Replica],
    outcomes: Vec<ContractResult<Endorsement>>,
) -> ContractResult<Endorsement> {
    let mut outcomes = outcomes.into_iter();
    let first = outcomes.next().ok_or(ContractError::NoReplicas)?;

    for (replica, outcome) in replicas.iter().skip(1).zip(outcomes) {
        let agrees = match (&first, &outcome) {
            (Ok(a), Ok(b)) => a.write_set_digest == b.write_set_digest && a.payload == b.payload,
            (Err(a), Err(b)) => a == b,
            _ => false,
        };
        if !agrees {
            tracing::warn!(
                operation = %operation,
                replica = replica.name(),
                "endorsement mismatch"
            );
            return Err(ContractError::EndorsementMismatch {
                operation,
                detail: format!("{} disagrees with {}", replica.name(), replicas[0].name()),
            });
        }
    }
    first
}

impl std::fmt::Debug for ReplicaSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaSet")
            .field("replicas", &self.replicas)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    use mdl_store::{InMemoryWorldState, StoreError, StoreResult, WorldState};
    use mdl_types::NamedArguments;
    use serde_json::json;

    use super::*;
    use crate::contract::ScanEntry;

    const PEERS: [&str; 2] = ["peer0.org1", "peer0.org2"];

    fn tenant(name: &str) -> TenantId {
        TenantId::new(name).unwrap()
    }

    fn diagnosis_args(id: &str) -> ArgumentList {
        OperationName::CreateDiagnosisAsset
            .bind(
                &NamedArguments::new()
                    .with("id", id)
                    .with("doctorId", "d1")
                    .with("patientId", "p1")
                    .with("appointmentId", "ap1")
                    .with("diagnosis", "flu")
                    .with("testRecommendations", "rest")
                    .with("prescription", "fluids"),
            )
            .unwrap()
    }

    fn id_args(id: &str) -> ArgumentList {
        ArgumentList::from_values(vec![json!(id)])
    }

    #[test]
    fn submit_commits_on_every_replica() {
        let set = ReplicaSet::in_memory(&PEERS).unwrap();
        let receipt = set
            .submit(&tenant("Org1MSP"), OperationName::CreateDiagnosisAsset, &diagnosis_args("a1"))
            .unwrap();
        assert_eq!(receipt.height, 1);

        for index in 0..set.len() {
            let payload = set
                .evaluate(index, OperationName::ReadAsset, &id_args("a1"))
                .unwrap();
            let TxPayload::Record(bytes) = payload else {
                panic!("expected a record");
            };
            let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(value["DoctorID"], json!("d1"));
        }

        let digests = set.state_digests().unwrap();
        assert_eq!(digests[0].1, digests[1].1);
        assert_eq!(set.history().unwrap()[0].submitter, tenant("Org1MSP"));
    }

    #[test]
    fn agreed_failure_is_returned_and_not_logged() {
        let set = ReplicaSet::in_memory(&PEERS).unwrap();
        let org = tenant("Org1MSP");
        set.submit(&org, OperationName::CreateDiagnosisAsset, &diagnosis_args("a1"))
            .unwrap();
        assert_eq!(
            set.submit(&org, OperationName::CreateDiagnosisAsset, &diagnosis_args("a1")),
            Err(ContractError::AlreadyExists("a1".into()))
        );
        assert_eq!(
            set.submit(&org, OperationName::DeleteAsset, &id_args("zz")),
            Err(ContractError::NotFound("zz".into()))
        );
        assert_eq!(set.height().unwrap(), 1);
    }

    #[test]
    fn evaluate_rejects_mutating_operations() {
        let set = ReplicaSet::in_memory(&PEERS).unwrap();
        assert_eq!(
            set.evaluate(0, OperationName::DeleteAsset, &id_args("a1")),
            Err(ContractError::NotReadOnly(OperationName::DeleteAsset))
        );
        assert_eq!(
            set.evaluate(9, OperationName::ReadAsset, &id_args("a1")),
            Err(ContractError::UnknownReplica(9))
        );
    }

    #[test]
    fn diverged_replica_blocks_commit() {
        let set = ReplicaSet::in_memory(&PEERS).unwrap();
        set.replica(1)
            .unwrap()
            .state()
            .put_state("a1", b"{\"ID\":\"a1\"}")
            .unwrap();

        let result = set.submit(
            &tenant("Org1MSP"),
            OperationName::CreateDiagnosisAsset,
            &diagnosis_args("a1"),
        );
        assert!(matches!(
            result,
            Err(ContractError::EndorsementMismatch { .. })
        ));
        assert!(set.replica(0).unwrap().state().is_empty().unwrap());
    }

    /// World state whose batches fail while `failing` is set.
    #[derive(Default)]
    struct FlakyState {
        inner: InMemoryWorldState,
        failing: AtomicBool,
    }

    impl WorldState for FlakyState {
        fn get_state(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
            self.inner.get_state(key)
        }

        fn put_state(&self, key: &str, value: &[u8]) -> StoreResult<()> {
            self.inner.put_state(key, value)
        }

        fn delete_state(&self, key: &str) -> StoreResult<bool> {
            self.inner.delete_state(key)
        }

        fn get_state_by_range(&self, start: &str, end: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
            self.inner.get_state_by_range(start, end)
        }

        fn apply_batch(&self, writes: &[StateWrite]) -> StoreResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::LockPoisoned);
            }
            self.inner.apply_batch(writes)
        }

        fn len(&self) -> StoreResult<usize> {
            self.inner.len()
        }
    }

    #[test]
    fn failed_commit_on_a_later_replica_rolls_back_earlier_ones() {
        let registry = Arc::new(OperationRegistry::standard());
        let flaky = Arc::new(FlakyState::default());
        let set = ReplicaSet::new(
            vec![
                Replica::in_memory(PEERS[0], Arc::clone(&registry)),
                Replica::new(PEERS[1], Arc::clone(&flaky) as Arc<dyn WorldState>, Arc::clone(&registry)),
            ],
            registry,
        )
        .unwrap();
        let org = tenant("Org1MSP");
        set.submit(&org, OperationName::CreateDiagnosisAsset, &diagnosis_args("a1"))
            .unwrap();
        let committed = set.state_digests().unwrap();

        flaky.failing.store(true, Ordering::SeqCst);
        assert_eq!(
            set.submit(&org, OperationName::CreateDiagnosisAsset, &diagnosis_args("a2")),
            Err(ContractError::Store(StoreError::LockPoisoned))
        );
        assert_eq!(
            set.submit(&org, OperationName::DeleteAsset, &id_args("a1")),
            Err(ContractError::Store(StoreError::LockPoisoned))
        );

        assert_eq!(set.state_digests().unwrap(), committed);
        assert!(set.replica(0).unwrap().state().get_state("a1").unwrap().is_some());
        assert!(set.replica(0).unwrap().state().get_state("a2").unwrap().is_none());
        assert_eq!(set.height().unwrap(), 1);
    }

    #[test]
    fn concurrent_creates_of_one_id_commit_once() {
        let set = Arc::new(ReplicaSet::in_memory(&PEERS).unwrap());
        let handles: Vec<_> = ["Org1MSP", "Org2MSP"]
            .into_iter()
            .map(|org| {
                let set = Arc::clone(&set);
                thread::spawn(move || {
                    set.submit(&tenant(org), OperationName::CreateDiagnosisAsset, &diagnosis_args("a1"))
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| *r == Err(ContractError::AlreadyExists("a1".into()))));
        assert_eq!(set.height().unwrap(), 1);
    }

    #[test]
    fn scan_after_many_creates_is_ordered() {
        let set = ReplicaSet::in_memory(&PEERS).unwrap();
        let org = tenant("Org1MSP");
        for i in (0..5).rev() {
            set.submit(&org, OperationName::CreateDiagnosisAsset, &diagnosis_args(&format!("a{i}")))
                .unwrap();
        }
        let TxPayload::Assets(entries) = set
            .evaluate(1, OperationName::GetAllAssets, &ArgumentList::empty())
            .unwrap()
        else {
            panic!("expected assets");
        };
        let ids: Vec<_> = entries
            .iter()
            .filter_map(|e| match e {
                ScanEntry::Record(v) => v["ID"].as_str().map(str::to_string),
                ScanEntry::Raw(_) => None,
            })
            .collect();
        assert_eq!(ids, vec!["a0", "a1", "a2", "a3", "a4"]);
    }
}

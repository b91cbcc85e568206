use std::sync::Arc;

use mdl_gate::{AdmissionGate, AdmissionRequest, Decision};
use mdl_types::{JobId, NamedArguments, OperationName, TenantId};

use crate::error::{QueueError, QueueResult};
use crate::job::{JobEntry, JobRecord};
use crate::store::JobStore;

/// Durable, tenant-tagged job admission.
///
/// A job is persisted only after the admission gate accepts it, and its id
/// is returned only after the store reports it durable. The queue never
/// touches the ledger.
pub struct SubmissionQueue {
    gate: Arc<AdmissionGate>,
    store: Arc<dyn JobStore>,
}

impl SubmissionQueue {
    pub fn new(gate: Arc<AdmissionGate>, store: Arc<dyn JobStore>) -> Self {
        Self { gate, store }
    }

    pub async fn enqueue(
        &self,
        tenant: &TenantId,
        operation: OperationName,
        arguments: NamedArguments,
    ) -> QueueResult<JobId> {
        let request = AdmissionRequest::new(tenant.clone(), operation, arguments);
        let result = self.gate.evaluate(&request).await?;

        match result.decision {
            Decision::Admitted(arguments) => {
                let record = JobRecord::new(tenant.clone(), operation, arguments);
                self.store.append(&record).await?;
                tracing::info!(
                    job_id = %record.job_id,
                    tenant = %tenant,
                    operation = %operation,
                    elapsed_us = result.elapsed.as_micros() as u64,
                    "job admitted"
                );
                Ok(record.job_id)
            }
            Decision::Invalid(violations) => Err(QueueError::Validation(violations)),
            Decision::Deferred {
                reason,
                retry_after,
            } => {
                tracing::warn!(tenant = %tenant, operation = %operation, %reason, "admission rejected");
                Err(QueueError::AdmissionRejected {
                    reason,
                    retry_after,
                })
            }
        }
    }

    /// A job's status, visible only to the tenant that submitted it.
    pub async fn status(&self, tenant: &TenantId, job_id: &JobId) -> QueueResult<Option<JobEntry>> {
        Ok(self
            .store
            .get(job_id)
            .await?
            .filter(|entry| &entry.record.tenant == tenant))
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use mdl_gate::{BackpressureGuard, GateConfig, StaticPolicySource};
    use serde_json::json;

    use super::*;
    use crate::job::JobStatus;
    use crate::store::InMemoryJobStore;

    fn queue(policy: &str) -> (SubmissionQueue, Arc<InMemoryJobStore>) {
        let guard = Arc::new(BackpressureGuard::new(
            Arc::new(StaticPolicySource::reporting("maxmemory-policy", policy)),
            GateConfig::default(),
        ));
        let gate = Arc::new(AdmissionGate::with_default_stages(GateConfig::default(), guard));
        let store = Arc::new(InMemoryJobStore::new());
        (SubmissionQueue::new(gate, store.clone()), store)
    }

    fn org1() -> TenantId {
        TenantId::new("Org1MSP").unwrap()
    }

    fn diagnosis() -> NamedArguments {
        NamedArguments::new()
            .with("prescription", "rest")
            .with("id", "a1")
            .with("doctorId", "d1")
            .with("testRecommendations", "none")
            .with("patientId", "p1")
            .with("diagnosis", "flu")
            .with("appointmentId", "ap1")
    }

    #[tokio::test]
    async fn enqueue_persists_positional_record() {
        let (queue, store) = queue("noeviction");
        let job_id = queue
            .enqueue(&org1(), OperationName::CreateDiagnosisAsset, diagnosis())
            .await
            .unwrap();

        let entry = queue.status(&org1(), &job_id).await.unwrap().unwrap();
        assert_eq!(entry.status, JobStatus::Pending);
        assert_eq!(
            entry.record.argument_list.values(),
            &[
                json!("a1"),
                json!("d1"),
                json!("p1"),
                json!("ap1"),
                json!("flu"),
                json!("none"),
                json!("rest")
            ]
        );
        assert_eq!(store.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn job_ids_are_unique() {
        let (queue, _) = queue("noeviction");
        let mut ids = std::collections::HashSet::new();
        for _ in 0..50 {
            let id = queue
                .enqueue(&org1(), OperationName::DeleteAsset, NamedArguments::new().with("id", "a1"))
                .await
                .unwrap();
            assert!(ids.insert(id));
        }
    }

    #[tokio::test]
    async fn evicting_store_rejects_without_side_effects() {
        let (queue, store) = queue("volatile-lru");
        let err = queue
            .enqueue(&org1(), OperationName::CreateDiagnosisAsset, diagnosis())
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::AdmissionRejected { .. }));
        assert!(!err.is_internal());
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn invalid_payload_is_rejected_without_side_effects() {
        let (queue, store) = queue("noeviction");
        let err = queue
            .enqueue(
                &org1(),
                OperationName::TransferAsset,
                NamedArguments::new().with("id", "a1"),
            )
            .await
            .unwrap_err();
        let QueueError::Validation(violations) = err else {
            panic!("expected validation error");
        };
        assert_eq!(violations[0].field, "newOwner");
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn reads_cannot_be_queued() {
        let (queue, _) = queue("noeviction");
        assert!(matches!(
            queue
                .enqueue(&org1(), OperationName::GetAllAssets, NamedArguments::new())
                .await,
            Err(QueueError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn status_is_scoped_to_the_submitting_tenant() {
        let (queue, _) = queue("noeviction");
        let job_id = queue
            .enqueue(&org1(), OperationName::DeleteAsset, NamedArguments::new().with("id", "a1"))
            .await
            .unwrap();
        let org2 = TenantId::new("Org2MSP").unwrap();
        assert!(queue.status(&org2, &job_id).await.unwrap().is_none());
    }
}

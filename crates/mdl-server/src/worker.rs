use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mdl_queue::{JobOutcome, JobRecord, QueueError};
use mdl_types::JobId;

use crate::dispatch::TenantRouter;
use crate::error::{ServerError, ServerResult};

/// Counts from one applier pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplierSummary {
    pub applied: usize,
    pub failed: usize,
    /// Jobs applied this pass whose outcome the store did not take.
    pub unrecorded: usize,
}

/// Applies admitted jobs to the ledger through each job's tenant handle.
///
/// Every pending job is submitted once and its terminal outcome recorded.
/// Failed jobs are not retried. When recording an outcome fails, the outcome
/// is held and recorded on a later pass instead of submitting the job again.
#[derive(Clone, Debug)]
pub struct JobApplier {
    router: Arc<TenantRouter>,
    unrecorded: Arc<Mutex<HashMap<JobId, JobOutcome>>>,
}

impl JobApplier {
    pub fn new(router: Arc<TenantRouter>) -> Self {
        Self {
            router,
            unrecorded: Arc::default(),
        }
    }

    fn held_outcome(&self, job_id: &JobId) -> ServerResult<Option<JobOutcome>> {
        let held = self.unrecorded.lock().map_err(|_| poisoned())?;
        Ok(held.get(job_id).cloned())
    }

    fn hold(&self, job_id: JobId, outcome: Option<JobOutcome>) -> ServerResult<()> {
        let mut held = self.unrecorded.lock().map_err(|_| poisoned())?;
        match outcome {
            Some(outcome) => held.insert(job_id, outcome),
            None => held.remove(&job_id),
        };
        Ok(())
    }

    /// Drain every job that is pending right now, in admission order.
    pub async fn run_once(&self) -> ServerResult<ApplierSummary> {
        let store = self.router.queue().store();
        let mut summary = ApplierSummary::default();

        for job in store.pending().await? {
            let outcome = match self.held_outcome(&job.job_id)? {
                Some(outcome) => outcome,
                None => {
                    let outcome = self.apply(&job).await?;
                    match &outcome {
                        JobOutcome::Completed => summary.applied += 1,
                        JobOutcome::Failed { reason } => {
                            summary.failed += 1;
                            tracing::warn!(
                                job_id = %job.job_id,
                                tenant = %job.tenant,
                                operation = %job.operation_name,
                                %reason,
                                "job failed"
                            );
                        }
                    }
                    outcome
                }
            };

            match store.finish(&job.job_id, &outcome).await {
                Ok(()) | Err(QueueError::AlreadyFinished(_)) => self.hold(job.job_id, None)?,
                Err(err) => {
                    summary.unrecorded += 1;
                    tracing::error!(job_id = %job.job_id, error = %err, "job outcome not recorded");
                    self.hold(job.job_id, Some(outcome))?;
                }
            }
        }

        if summary != ApplierSummary::default() {
            tracing::info!(
                applied = summary.applied,
                failed = summary.failed,
                unrecorded = summary.unrecorded,
                "applier pass finished"
            );
        }
        Ok(summary)
    }

    async fn apply(&self, job: &JobRecord) -> ServerResult<JobOutcome> {
        let Some(context) = self.router.tenant(&job.tenant) else {
            return Ok(JobOutcome::Failed {
                reason: format!("tenant {} has no contract handle", job.tenant),
            });
        };

        let handle = context.handle().clone();
        let operation = job.operation_name;
        let arguments = job.argument_list.clone();
        let result = tokio::task::spawn_blocking(move || handle.submit(operation, &arguments))
            .await
            .map_err(|e| ServerError::Internal(format!("applier task failed: {e}")))?;

        Ok(match result {
            Ok(receipt) => {
                tracing::debug!(
                    job_id = %job.job_id,
                    height = receipt.height,
                    digest = %receipt.write_set_digest.short_hex(),
                    "job applied"
                );
                JobOutcome::Completed
            }
            Err(err) => JobOutcome::Failed {
                reason: err.to_string(),
            },
        })
    }

    /// Run a pass every `interval` until the task is dropped.
    pub async fn run_every(self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = self.run_once().await {
                tracing::error!(error = %err, "applier pass aborted");
            }
        }
    }
}

fn poisoned() -> ServerError {
    ServerError::Internal("applier outcome lock poisoned".into())
}

#[cfg(test)]
mod tests {
    use mdl_gate::{AdmissionGate, BackpressureGuard, GateConfig, StaticPolicySource};
    use mdl_ledger::ReplicaSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use mdl_queue::{
        InMemoryJobStore, JobEntry, JobStatus, JobStore, QueueResult, SubmissionQueue,
    };
    use mdl_types::{NamedArguments, OperationName, TenantId};

    use super::*;
    use crate::config::TenantConfig;
    use crate::tenant::TenantRegistry;

    fn setup() -> (JobApplier, Arc<TenantRouter>, Arc<ReplicaSet>) {
        setup_with(Arc::new(InMemoryJobStore::new()))
    }

    fn setup_with(store: Arc<dyn JobStore>) -> (JobApplier, Arc<TenantRouter>, Arc<ReplicaSet>) {
        let network = Arc::new(ReplicaSet::in_memory(&["peer0.org1", "peer0.org2"]).unwrap());
        let tenants = TenantRegistry::build(
            &network,
            &[TenantConfig {
                msp_id: "Org1MSP".into(),
                api_keys: vec![],
                replica: "peer0.org1".into(),
            }],
        )
        .unwrap();
        let guard = Arc::new(BackpressureGuard::new(
            Arc::new(StaticPolicySource::reporting("maxmemory-policy", "noeviction")),
            GateConfig::default(),
        ));
        let gate = Arc::new(AdmissionGate::with_default_stages(GateConfig::default(), guard));
        let queue = Arc::new(SubmissionQueue::new(gate, store));
        let router = Arc::new(TenantRouter::new(tenants, queue));
        (JobApplier::new(Arc::clone(&router)), router, network)
    }

    fn insurance(id: &str) -> NamedArguments {
        NamedArguments::new()
            .with("id", id)
            .with("patientId", "p1")
            .with("paymentId", "pay1")
            .with("status", "pending")
    }

    #[tokio::test]
    async fn pass_applies_jobs_and_records_outcomes() {
        let (applier, router, network) = setup();
        let org1 = TenantId::new("Org1MSP").unwrap();
        let queue = router.queue();

        let created = queue
            .enqueue(&org1, OperationName::CreateInsuranceAsset, insurance("i1"))
            .await
            .unwrap();
        let duplicate = queue
            .enqueue(&org1, OperationName::CreateInsuranceAsset, insurance("i1"))
            .await
            .unwrap();
        assert_eq!(network.height().unwrap(), 0);

        let summary = applier.run_once().await.unwrap();
        assert_eq!(summary, ApplierSummary { applied: 1, failed: 1, unrecorded: 0 });
        assert_eq!(network.height().unwrap(), 1);

        let store = queue.store();
        assert_eq!(store.get(&created).await.unwrap().unwrap().status, JobStatus::Completed);
        assert_eq!(
            store.get(&duplicate).await.unwrap().unwrap().status,
            JobStatus::Failed {
                reason: "the asset i1 already exists".into()
            }
        );
        assert!(store.pending().await.unwrap().is_empty());
        assert_eq!(applier.run_once().await.unwrap(), ApplierSummary::default());
    }

    #[tokio::test]
    async fn job_from_unknown_tenant_fails() {
        let (applier, router, network) = setup();
        router
            .queue()
            .enqueue(
                &TenantId::new("Org9MSP").unwrap(),
                OperationName::DeleteAsset,
                NamedArguments::new().with("id", "a1"),
            )
            .await
            .unwrap();

        assert_eq!(applier.run_once().await.unwrap().failed, 1);
        assert_eq!(network.height().unwrap(), 0);
    }

    /// Job store whose next `failures` finishes fail.
    #[derive(Default)]
    struct FlakyFinish {
        inner: InMemoryJobStore,
        failures: AtomicUsize,
    }

    #[async_trait]
    impl JobStore for FlakyFinish {
        async fn append(&self, record: &JobRecord) -> QueueResult<()> {
            self.inner.append(record).await
        }

        async fn get(&self, job_id: &JobId) -> QueueResult<Option<JobEntry>> {
            self.inner.get(job_id).await
        }

        async fn pending(&self) -> QueueResult<Vec<JobRecord>> {
            self.inner.pending().await
        }

        async fn finish(&self, job_id: &JobId, outcome: &JobOutcome) -> QueueResult<()> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(QueueError::Io(std::io::Error::other("disk full")));
            }
            self.inner.finish(job_id, outcome).await
        }
    }

    #[tokio::test]
    async fn unrecorded_outcome_is_retried_without_reapplying() {
        let store = Arc::new(FlakyFinish::default());
        let (applier, router, network) = setup_with(Arc::clone(&store) as Arc<dyn JobStore>);
        let org1 = TenantId::new("Org1MSP").unwrap();
        let job_id = router
            .queue()
            .enqueue(&org1, OperationName::CreateInsuranceAsset, insurance("i1"))
            .await
            .unwrap();

        store.failures.store(1, Ordering::SeqCst);
        let first = applier.run_once().await.unwrap();
        assert_eq!(first, ApplierSummary { applied: 1, failed: 0, unrecorded: 1 });
        assert_eq!(network.height().unwrap(), 1);
        assert_eq!(store.get(&job_id).await.unwrap().unwrap().status, JobStatus::Pending);

        assert_eq!(applier.run_once().await.unwrap(), ApplierSummary::default());
        assert_eq!(network.height().unwrap(), 1);
        assert_eq!(store.get(&job_id).await.unwrap().unwrap().status, JobStatus::Completed);
        assert!(applier.held_outcome(&job_id).unwrap().is_none());
    }
}

use std::sync::Arc;

use mdl_ledger::{ContractError, TxPayload};
use mdl_queue::{JobEntry, QueueError, SubmissionQueue};
use mdl_types::{JobId, NamedArguments, OperationName, SchemaViolation, TenantId};

use crate::error::ApiError;
use crate::tenant::{TenantContext, TenantRegistry};

/// Where a request went.
#[derive(Clone, Debug, PartialEq)]
pub enum Dispatched {
    /// A read, answered from the tenant's replica.
    Evaluated(TxPayload),
    /// A mutation, admitted as a job.
    Queued(JobId),
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("invalid arguments for {operation}")]
    Validation {
        operation: OperationName,
        violations: Vec<SchemaViolation>,
    },

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Validation { violations, .. } => ApiError::invalid_body(violations),
            DispatchError::Contract(err) => err.into(),
            DispatchError::Queue(err) => err.into(),
        }
    }
}

/// Routes each request by operation kind on behalf of a tenant.
///
/// Reads are evaluated synchronously against the tenant's own handle.
/// Mutations always go through the submission queue and never touch the
/// ledger here.
pub struct TenantRouter {
    tenants: TenantRegistry,
    queue: Arc<SubmissionQueue>,
}

impl TenantRouter {
    pub fn new(tenants: TenantRegistry, queue: Arc<SubmissionQueue>) -> Self {
        Self { tenants, queue }
    }

    pub fn tenant(&self, tenant: &TenantId) -> Option<Arc<TenantContext>> {
        self.tenants.get(tenant)
    }

    pub fn tenants(&self) -> &TenantRegistry {
        &self.tenants
    }

    pub fn queue(&self) -> &Arc<SubmissionQueue> {
        &self.queue
    }

    pub async fn dispatch(
        &self,
        context: &TenantContext,
        operation: OperationName,
        arguments: NamedArguments,
    ) -> Result<Dispatched, DispatchError> {
        if operation.is_mutating() {
            let job_id = self
                .queue
                .enqueue(context.tenant(), operation, arguments)
                .await?;
            return Ok(Dispatched::Queued(job_id));
        }

        let bound = operation
            .bind(&arguments)
            .map_err(|violations| DispatchError::Validation {
                operation,
                violations,
            })?;
        tracing::debug!(tenant = %context.tenant(), operation = %operation, "evaluating read");
        let payload = context.handle().evaluate(operation, &bound)?;
        Ok(Dispatched::Evaluated(payload))
    }

    /// Status of a job the tenant submitted. Other tenants' jobs look absent.
    pub async fn job_status(
        &self,
        context: &TenantContext,
        job_id: &JobId,
    ) -> Result<Option<JobEntry>, DispatchError> {
        Ok(self.queue.status(context.tenant(), job_id).await?)
    }
}

impl std::fmt::Debug for TenantRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantRouter")
            .field("tenants", &self.tenants.len())
            .finish()
    }
}

use std::time::Duration;

use async_trait::async_trait;
use mdl_types::{ArgumentList, NamedArguments, OperationName, SchemaViolation, TenantId};

use crate::error::GateResult;

/// A caller's request to admit one mutating job.
#[derive(Clone, Debug)]
pub struct AdmissionRequest {
    pub tenant: TenantId,
    pub operation: OperationName,
    pub arguments: NamedArguments,
}

impl AdmissionRequest {
    pub fn new(tenant: TenantId, operation: OperationName, arguments: NamedArguments) -> Self {
        Self {
            tenant,
            operation,
            arguments,
        }
    }
}

/// The outcome of a single gate stage evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageDecision {
    /// The stage passed; proceed to the next stage.
    Pass,
    /// The request is malformed and will never be admitted as is.
    Fail { reason: String },
    /// The request cannot be admitted now; the caller may retry later.
    Defer {
        reason: String,
        retry_after: Duration,
    },
}

impl StageDecision {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Recorded result from a completed stage evaluation.
#[derive(Clone, Debug)]
pub struct StageResult {
    pub stage_name: String,
    pub passed: bool,
    pub reason: Option<String>,
    pub elapsed: Duration,
}

/// State shared by the stages of one evaluation.
#[derive(Debug, Default)]
pub struct GateContext {
    /// Positional arguments, once a stage has bound them to the schema.
    pub bound: Option<ArgumentList>,
    /// Field-level problems found so far.
    pub violations: Vec<SchemaViolation>,
    /// Results from stages that have already run in this evaluation.
    pub previous_stages: Vec<StageResult>,
}

/// A single evaluation stage in the admission pipeline.
///
/// Stages run in order and may record what they learn in the context.
#[async_trait]
pub trait GateStage: Send + Sync {
    fn name(&self) -> &str;

    async fn evaluate(
        &self,
        request: &AdmissionRequest,
        context: &mut GateContext,
    ) -> GateResult<StageDecision>;
}

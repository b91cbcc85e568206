use std::sync::Arc;
use std::time::{Duration, Instant};

use mdl_types::{ArgumentList, SchemaViolation};

use crate::config::GateConfig;
use crate::error::{GateError, GateResult};
use crate::policy::BackpressureGuard;
use crate::stage::{AdmissionRequest, GateContext, GateStage, StageDecision, StageResult};
use crate::stages::{EvictionPolicyStage, SchemaStage};

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Final verdict of the admission pipeline.
#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    /// Every stage passed; the job may be persisted with these arguments.
    Admitted(ArgumentList),
    /// The request is malformed.
    Invalid(Vec<SchemaViolation>),
    /// The request is well-formed but cannot be admitted now.
    Deferred { reason: String, retry_after: Duration },
}

/// The outcome of running a request through the full pipeline.
#[derive(Clone, Debug)]
pub struct AdmissionResult {
    pub decision: Decision,
    /// Per-stage results in evaluation order.
    pub stage_results: Vec<StageResult>,
    /// Total wall-clock time for the pipeline evaluation.
    pub elapsed: Duration,
}

impl AdmissionResult {
    pub fn is_admitted(&self) -> bool {
        matches!(self.decision, Decision::Admitted(_))
    }
}

// ---------------------------------------------------------------------------
// AdmissionGate
// ---------------------------------------------------------------------------

/// The admission gate: a pipeline of stages every mutating request passes
/// through before it is persisted as a job.
///
/// The pipeline is fail-fast. Schema checks run before the eviction-policy
/// query, so malformed requests never touch the admission store.
pub struct AdmissionGate {
    stages: Vec<Box<dyn GateStage>>,
    config: GateConfig,
}

impl AdmissionGate {
    /// Create a gate with an empty pipeline.
    pub fn new(config: GateConfig) -> Self {
        Self {
            stages: Vec::new(),
            config,
        }
    }

    /// Schema -> EvictionPolicy
    pub fn with_default_stages(config: GateConfig, guard: Arc<BackpressureGuard>) -> Self {
        let mut gate = Self::new(config);
        gate.add_stage(Box::new(SchemaStage));
        gate.add_stage(Box::new(EvictionPolicyStage::new(guard)));
        gate
    }

    pub fn add_stage(&mut self, stage: Box<dyn GateStage>) {
        self.stages.push(stage);
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Evaluate a request through the full pipeline.
    pub async fn evaluate(&self, request: &AdmissionRequest) -> GateResult<AdmissionResult> {
        let pipeline_start = Instant::now();
        let mut context = GateContext::default();
        let mut stage_results = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            let stage_start = Instant::now();
            let decision = stage.evaluate(request, &mut context).await?;

            let (passed, reason) = match &decision {
                StageDecision::Pass => (true, None),
                StageDecision::Fail { reason } | StageDecision::Defer { reason, .. } => {
                    (false, Some(reason.clone()))
                }
            };
            let result = StageResult {
                stage_name: stage.name().to_string(),
                passed,
                reason,
                elapsed: stage_start.elapsed(),
            };
            stage_results.push(result.clone());
            context.previous_stages.push(result);

            let verdict = match decision {
                StageDecision::Pass => continue,
                StageDecision::Fail { reason } => {
                    let mut violations = std::mem::take(&mut context.violations);
                    if violations.is_empty() {
                        violations.push(SchemaViolation::new(stage.name(), reason));
                    }
                    Decision::Invalid(violations)
                }
                StageDecision::Defer {
                    reason,
                    retry_after,
                } => Decision::Deferred {
                    reason,
                    retry_after,
                },
            };

            tracing::debug!(
                tenant = %request.tenant,
                operation = %request.operation,
                stage = stage.name(),
                "admission stopped"
            );
            return Ok(AdmissionResult {
                decision: verdict,
                stage_results,
                elapsed: pipeline_start.elapsed(),
            });
        }

        let bound = context
            .bound
            .ok_or_else(|| GateError::Config("no stage bound the request arguments".into()))?;
        Ok(AdmissionResult {
            decision: Decision::Admitted(bound),
            stage_results,
            elapsed: pipeline_start.elapsed(),
        })
    }
}

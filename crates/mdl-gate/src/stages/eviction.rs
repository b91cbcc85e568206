use std::sync::Arc;

use async_trait::async_trait;

use crate::error::GateResult;
use crate::policy::BackpressureGuard;
use crate::stage::{AdmissionRequest, GateContext, GateStage, StageDecision};

/// Defers admission while the backpressure guard refuses it.
pub struct EvictionPolicyStage {
    guard: Arc<BackpressureGuard>,
}

impl EvictionPolicyStage {
    pub fn new(guard: Arc<BackpressureGuard>) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl GateStage for EvictionPolicyStage {
    fn name(&self) -> &str {
        "eviction-policy"
    }

    async fn evaluate(
        &self,
        _request: &AdmissionRequest,
        _context: &mut GateContext,
    ) -> GateResult<StageDecision> {
        if self.guard.check_admission_policy().await {
            return Ok(StageDecision::Pass);
        }
        let config = self.guard.config();
        Ok(StageDecision::Defer {
            reason: format!(
                "admission store {} is not {}",
                config.policy_parameter, config.required_policy
            ),
            retry_after: self.guard.retry_after(),
        })
    }
}

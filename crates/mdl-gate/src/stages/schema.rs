use async_trait::async_trait;
use mdl_types::SchemaViolation;

use crate::error::GateResult;
use crate::stage::{AdmissionRequest, GateContext, GateStage, StageDecision};

/// Checks the named payload against the operation's parameter schema and
/// binds it to positional form.
///
/// Only mutating operations are admissible; reads never enter the queue.
pub struct SchemaStage;

#[async_trait]
impl GateStage for SchemaStage {
    fn name(&self) -> &str {
        "schema"
    }

    async fn evaluate(
        &self,
        request: &AdmissionRequest,
        context: &mut GateContext,
    ) -> GateResult<StageDecision> {
        if !request.operation.is_mutating() {
            let violation = SchemaViolation::new(
                "operationName",
                format!("{} is read-only and cannot be queued", request.operation),
            );
            let reason = violation.to_string();
            context.violations.push(violation);
            return Ok(StageDecision::Fail { reason });
        }

        match request.operation.bind(&request.arguments) {
            Ok(bound) => {
                context.bound = Some(bound);
                Ok(StageDecision::Pass)
            }
            Err(violations) => {
                let reason = violations
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                context.violations.extend(violations);
                Ok(StageDecision::Fail { reason })
            }
        }
    }
}

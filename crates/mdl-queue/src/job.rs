use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mdl_types::{ArgumentList, JobId, OperationName, TenantId};

/// A job as persisted at admission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub job_id: JobId,
    pub tenant: TenantId,
    pub operation_name: OperationName,
    pub argument_list: ArgumentList,
    pub admitted_at: DateTime<Utc>,
}

impl JobRecord {
    /// A new record with a fresh id, stamped now.
    pub fn new(tenant: TenantId, operation_name: OperationName, argument_list: ArgumentList) -> Self {
        Self {
            job_id: JobId::new(),
            tenant,
            operation_name,
            argument_list,
            admitted_at: Utc::now(),
        }
    }
}

/// Terminal result reported by the worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    Completed,
    Failed { reason: String },
}

/// Where a job is in its lifecycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum JobStatus {
    Pending,
    Completed,
    Failed { reason: String },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl From<JobOutcome> for JobStatus {
    fn from(outcome: JobOutcome) -> Self {
        match outcome {
            JobOutcome::Completed => Self::Completed,
            JobOutcome::Failed { reason } => Self::Failed { reason },
        }
    }
}

/// A job together with its current status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobEntry {
    pub record: JobRecord,
    pub status: JobStatus,
}

impl JobEntry {
    pub fn pending(record: JobRecord) -> Self {
        Self {
            record,
            status: JobStatus::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn record_wire_shape() {
        let record = JobRecord::new(
            TenantId::new("Org1MSP").unwrap(),
            OperationName::DeleteAsset,
            ArgumentList::from_values(vec![json!("a1")]),
        );
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["tenant"], json!("Org1MSP"));
        assert_eq!(value["operationName"], json!("DeleteAsset"));
        assert_eq!(value["argumentList"], json!(["a1"]));
        assert_eq!(value["jobId"], json!(record.job_id.to_string()));
        assert!(value["admittedAt"].is_string());
    }

    #[test]
    fn status_wire_shape() {
        assert_eq!(
            serde_json::to_value(JobStatus::Pending).unwrap(),
            json!({"state": "pending"})
        );
        assert_eq!(
            serde_json::to_value(JobStatus::from(JobOutcome::Failed {
                reason: "nope".into()
            }))
            .unwrap(),
            json!({"state": "failed", "reason": "nope"})
        );
    }
}

use std::io;
use std::time::Duration;

use mdl_gate::GateError;
use mdl_types::{JobId, SchemaViolation};

fn list(violations: &[SchemaViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors produced by the submission queue and its job stores.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The payload does not match the operation's parameter schema.
    #[error("invalid job arguments: {}", list(.0))]
    Validation(Vec<SchemaViolation>),

    /// The backpressure guard refused admission.
    #[error("admission rejected: {reason}")]
    AdmissionRejected { reason: String, retry_after: Duration },

    #[error("unknown job {0}")]
    UnknownJob(JobId),

    #[error("job {0} is already finished")]
    AlreadyFinished(JobId),

    /// I/O error during journal operations.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A failed append could not be cut back; the journal tail is unknown.
    #[error("job journal is unusable after a failed rollback at offset {offset}")]
    JournalPoisoned { offset: u64 },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("gate error: {0}")]
    Gate(#[from] GateError),

    #[error("job store lock poisoned")]
    LockPoisoned,
}

impl QueueError {
    /// Whether the failure is on our side rather than the caller's.
    pub fn is_internal(&self) -> bool {
        !matches!(
            self,
            Self::Validation(_) | Self::AdmissionRejected { .. } | Self::UnknownJob(_)
        )
    }
}

/// Convenience alias used throughout the queue crate.
pub type QueueResult<T> = Result<T, QueueError>;

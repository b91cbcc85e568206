use mdl_crypto::CanonicalError;
use mdl_store::StoreError;
use mdl_types::{OperationName, TypeError};

/// Errors produced by contract transitions and the replica set.
///
/// Transitions are deterministic, so replicas that fail on the same input
/// fail with equal errors; the replica set compares them with `PartialEq`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    #[error("the asset {0} does not exist")]
    NotFound(String),

    #[error("the asset {0} already exists")]
    AlreadyExists(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("stored record {id} is not a decodable asset: {reason}")]
    CorruptRecord { id: String, reason: String },

    #[error("{0} modifies state and must be submitted, not evaluated")]
    NotReadOnly(OperationName),

    #[error("replicas disagree on {operation}: {detail}")]
    EndorsementMismatch {
        operation: OperationName,
        detail: String,
    },

    #[error("replay diverged at height {height}")]
    ReplayDivergence { height: u64 },

    #[error("replica index {0} is out of range")]
    UnknownReplica(usize),

    #[error("a replica set needs at least one replica")]
    NoReplicas,

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("commit lock poisoned")]
    LockPoisoned,
}

impl From<TypeError> for ContractError {
    fn from(err: TypeError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<CanonicalError> for ContractError {
    fn from(err: CanonicalError) -> Self {
        Self::Encoding(err.to_string())
    }
}

/// Result alias for contract operations.
pub type ContractResult<T> = Result<T, ContractError>;

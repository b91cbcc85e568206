use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("tenant identity must not be empty")]
    EmptyTenant,

    #[error("invalid job id: {0}")]
    InvalidJobId(String),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("unknown asset type: {0}")]
    UnknownAssetKind(String),

    #[error("expected {expected} arguments, got {actual}")]
    Arity { expected: usize, actual: usize },

    #[error("argument '{name}' {reason}")]
    Argument { name: String, reason: String },

    #[error("invalid asset: {0}")]
    InvalidAsset(String),
}

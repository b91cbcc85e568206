/// Errors that can occur during admission.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// The admission store could not be queried.
    #[error("admission store error: {0}")]
    Store(#[from] redis::RedisError),

    /// The admission store did not answer in time.
    #[error("admission store did not answer within {0:?}")]
    Timeout(std::time::Duration),

    /// A stage returned an unexpected error.
    #[error("stage error in '{stage}': {message}")]
    StageError { stage: String, message: String },

    /// Configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl GateError {
    /// Create a stage error with a name and message.
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StageError {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// Result alias for gate operations.
pub type GateResult<T> = Result<T, GateError>;

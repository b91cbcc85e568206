use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use mdl_ledger::ContractError;
use mdl_queue::QueueError;
use mdl_types::SchemaViolation;

use crate::response::envelope;

/// Failures while assembling or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("contract error: {0}")]
    Contract(#[from] ContractError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("gate error: {0}")]
    Gate(#[from] mdl_gate::GateError),

    #[error("invalid identity: {0}")]
    Identity(#[from] mdl_types::TypeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

/// Caller-facing failure of a single request.
///
/// Only the variants below reach the wire. Anything the caller cannot act on
/// collapses into [`ApiError::Internal`] with a generic body; the detail goes
/// to the log instead.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    Validation {
        message: String,
        errors: Vec<SchemaViolation>,
    },
    AssetIdMismatch,
    NotFound,
    Conflict,
    AdmissionRejected {
        retry_after: Duration,
    },
    Internal,
}

impl ApiError {
    /// Invalid request body with the violations that caused it.
    pub fn invalid_body(errors: Vec<SchemaViolation>) -> Self {
        Self::Validation {
            message: "Invalid request body".into(),
            errors,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Validation { .. } | Self::AssetIdMismatch => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::AdmissionRejected { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::Validation { message, errors } => envelope(
                status,
                json!({
                    "reason": "VALIDATION_ERROR",
                    "message": message,
                    "errors": errors,
                }),
            ),
            Self::AssetIdMismatch => envelope(
                status,
                json!({
                    "reason": "ASSET_ID_MISMATCH",
                    "message": "Asset IDs must match",
                }),
            ),
            Self::AdmissionRejected { retry_after } => {
                let mut response = envelope(
                    status,
                    json!({
                        "reason": "ADMISSION_REJECTED",
                        "message": "Job store cannot guarantee durability, retry later",
                    }),
                );
                if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().max(1).to_string()) {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
                response
            }
            _ => envelope(status, json!({})),
        }
    }
}

impl From<ContractError> for ApiError {
    fn from(err: ContractError) -> Self {
        match err {
            ContractError::NotFound(_) => Self::NotFound,
            ContractError::AlreadyExists(_) => Self::Conflict,
            ContractError::InvalidArgument(reason) => Self::Validation {
                message: reason,
                errors: Vec::new(),
            },
            other => {
                tracing::error!(error = %other, "contract evaluation failed");
                Self::Internal
            }
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Validation(violations) => Self::invalid_body(violations),
            QueueError::AdmissionRejected { retry_after, .. } => {
                Self::AdmissionRejected { retry_after }
            }
            QueueError::UnknownJob(_) => Self::NotFound,
            other => {
                tracing::error!(error = %other, "job admission failed");
                Self::Internal
            }
        }
    }
}

//! Translation of HTTP bodies into named operation arguments.
//!
//! Only the request's shape is checked here. Field-level validation against
//! the operation schema happens at admission.

use serde_json::Value;

use mdl_types::{AssetKind, NamedArguments, OperationName, SchemaViolation};

use crate::error::ApiError;

fn invalid(field: &str, message: &str) -> ApiError {
    ApiError::invalid_body(vec![SchemaViolation::new(field, message)])
}

/// Parse a request body as JSON.
pub fn parse_body(bytes: &[u8]) -> Result<Value, ApiError> {
    if bytes.is_empty() {
        return Err(invalid("body", "must not be empty"));
    }
    serde_json::from_slice(bytes).map_err(|_| invalid("body", "must be valid JSON"))
}

/// `POST /api/assets`: the `type` field picks the creation transition and
/// every other field is an argument.
pub fn create_arguments(body: Value) -> Result<(OperationName, NamedArguments), ApiError> {
    let mut arguments = NamedArguments::from_object(body)
        .map_err(|_| invalid("body", "body must contain an asset object"))?;
    let kind = match arguments.remove("type") {
        Some(Value::String(kind)) => kind
            .parse::<AssetKind>()
            .map_err(|_| invalid("type", "must be one of diagnosis, insurance, transaction"))?,
        _ => return Err(invalid("type", "must be a string")),
    };
    Ok((kind.create_operation(), arguments))
}

/// `PUT /api/assets/:id`: the body is the full replacement asset in stored
/// form, and its `ID` must name the asset in the path.
pub fn update_arguments(id: &str, body: Value) -> Result<NamedArguments, ApiError> {
    if !body.is_object() {
        return Err(invalid("body", "body must contain an asset object"));
    }
    match body.get("ID") {
        Some(Value::String(body_id)) if body_id == id => {}
        Some(Value::String(_)) => return Err(ApiError::AssetIdMismatch),
        _ => return Err(invalid("ID", "must be a string")),
    }
    Ok(NamedArguments::new().with("id", id).with("asset", body))
}

/// `PATCH /api/assets/:id`: exactly `[{"op":"replace","path":"/owner","value":<string>}]`.
pub fn transfer_arguments(id: &str, body: Value) -> Result<NamedArguments, ApiError> {
    let operation = match body {
        Value::Array(mut ops) if ops.len() == 1 => ops.remove(0),
        _ => {
            return Err(invalid(
                "body",
                "body must contain an array with a single patch operation",
            ))
        }
    };

    let mut violations = Vec::new();
    if operation.get("op").and_then(Value::as_str) != Some("replace") {
        violations.push(SchemaViolation::new("[0].op", "operation must be 'replace'"));
    }
    if operation.get("path").and_then(Value::as_str) != Some("/owner") {
        violations.push(SchemaViolation::new("[0].path", "path must be '/owner'"));
    }
    let owner = operation.get("value").and_then(Value::as_str);
    if owner.is_none() {
        violations.push(SchemaViolation::new("[0].value", "must be a string"));
    }

    match owner {
        Some(owner) if violations.is_empty() => {
            Ok(NamedArguments::new().with("id", id).with("newOwner", owner))
        }
        _ => Err(ApiError::invalid_body(violations)),
    }
}

pub fn id_arguments(id: &str) -> NamedArguments {
    NamedArguments::new().with("id", id)
}

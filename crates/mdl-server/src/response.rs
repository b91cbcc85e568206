use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::{Map, Value};

/// A JSON body stamped with the reason phrase and the current time.
///
/// `fields` must be an object; its entries are merged after `status` and
/// `timestamp`.
pub fn envelope(status: StatusCode, fields: Value) -> Response {
    let mut body = Map::new();
    body.insert(
        "status".into(),
        Value::String(status.canonical_reason().unwrap_or_default().to_string()),
    );
    body.insert(
        "timestamp".into(),
        Value::String(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
    );
    if let Value::Object(extra) = fields {
        body.extend(extra);
    }
    (status, Json(Value::Object(body))).into_response()
}

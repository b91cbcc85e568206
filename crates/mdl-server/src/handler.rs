use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde_json::{json, Value};

use mdl_ledger::TxPayload;
use mdl_types::{JobId, NamedArguments, OperationName};

use crate::auth::CallerTenant;
use crate::dispatch::Dispatched;
use crate::error::ApiError;
use crate::request;
use crate::response::envelope;
use crate::state::AppState;

/// Methods allowed on an existing asset.
pub const ASSET_ALLOW: &str = "DELETE,GET,OPTIONS,PATCH,PUT";

type ApiResult = Result<Response, ApiError>;

pub async fn health() -> Response {
    envelope(StatusCode::OK, json!({}))
}

pub async fn list_assets(State(state): State<AppState>, CallerTenant(ctx): CallerTenant) -> ApiResult {
    match state
        .router
        .dispatch(&ctx, OperationName::GetAllAssets, NamedArguments::new())
        .await?
    {
        Dispatched::Evaluated(TxPayload::Assets(entries)) => Ok(Json(entries).into_response()),
        other => Err(unexpected(OperationName::GetAllAssets, &other)),
    }
}

pub async fn create_asset(
    State(state): State<AppState>,
    CallerTenant(ctx): CallerTenant,
    body: Bytes,
) -> ApiResult {
    let (operation, arguments) = request::create_arguments(request::parse_body(&body)?)?;
    tracing::info!(tenant = %ctx.tenant(), %operation, "create asset request received");
    queued(state.router.dispatch(&ctx, operation, arguments).await?, operation)
}

pub async fn asset_options(
    State(state): State<AppState>,
    CallerTenant(ctx): CallerTenant,
    Path(asset_id): Path<String>,
) -> ApiResult {
    match state
        .router
        .dispatch(&ctx, OperationName::AssetExists, request::id_arguments(&asset_id))
        .await?
    {
        Dispatched::Evaluated(TxPayload::Exists(true)) => {
            let mut response = envelope(StatusCode::OK, json!({}));
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static(ASSET_ALLOW));
            Ok(response)
        }
        Dispatched::Evaluated(TxPayload::Exists(false)) => Err(ApiError::NotFound),
        other => Err(unexpected(OperationName::AssetExists, &other)),
    }
}

pub async fn read_asset(
    State(state): State<AppState>,
    CallerTenant(ctx): CallerTenant,
    Path(asset_id): Path<String>,
) -> ApiResult {
    tracing::debug!(tenant = %ctx.tenant(), asset_id = %asset_id, "read asset request received");
    match state
        .router
        .dispatch(&ctx, OperationName::ReadAsset, request::id_arguments(&asset_id))
        .await?
    {
        Dispatched::Evaluated(TxPayload::Record(bytes)) => {
            let asset: Value = serde_json::from_slice(&bytes).map_err(|err| {
                tracing::error!(asset_id = %asset_id, error = %err, "stored record is not JSON");
                ApiError::Internal
            })?;
            Ok(Json(asset).into_response())
        }
        other => Err(unexpected(OperationName::ReadAsset, &other)),
    }
}

pub async fn update_asset(
    State(state): State<AppState>,
    CallerTenant(ctx): CallerTenant,
    Path(asset_id): Path<String>,
    body: Bytes,
) -> ApiResult {
    let arguments = request::update_arguments(&asset_id, request::parse_body(&body)?)?;
    tracing::debug!(tenant = %ctx.tenant(), asset_id = %asset_id, "update asset request received");
    queued(
        state
            .router
            .dispatch(&ctx, OperationName::UpdateAsset, arguments)
            .await?,
        OperationName::UpdateAsset,
    )
}

pub async fn transfer_asset(
    State(state): State<AppState>,
    CallerTenant(ctx): CallerTenant,
    Path(asset_id): Path<String>,
    body: Bytes,
) -> ApiResult {
    let arguments = request::transfer_arguments(&asset_id, request::parse_body(&body)?)?;
    tracing::debug!(tenant = %ctx.tenant(), asset_id = %asset_id, "transfer asset request received");
    queued(
        state
            .router
            .dispatch(&ctx, OperationName::TransferAsset, arguments)
            .await?,
        OperationName::TransferAsset,
    )
}

pub async fn delete_asset(
    State(state): State<AppState>,
    CallerTenant(ctx): CallerTenant,
    Path(asset_id): Path<String>,
) -> ApiResult {
    tracing::debug!(tenant = %ctx.tenant(), asset_id = %asset_id, "delete asset request received");
    queued(
        state
            .router
            .dispatch(&ctx, OperationName::DeleteAsset, request::id_arguments(&asset_id))
            .await?,
        OperationName::DeleteAsset,
    )
}

pub async fn job_status(
    State(state): State<AppState>,
    CallerTenant(ctx): CallerTenant,
    Path(job_id): Path<String>,
) -> ApiResult {
    let job_id = JobId::parse(&job_id).map_err(|_| ApiError::NotFound)?;
    let entry = state
        .router
        .job_status(&ctx, &job_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(envelope(
        StatusCode::OK,
        json!({
            "jobId": entry.record.job_id,
            "operationName": entry.record.operation_name,
            "admittedAt": entry.record.admitted_at,
            "jobStatus": entry.status,
        }),
    ))
}

fn queued(dispatched: Dispatched, operation: OperationName) -> ApiResult {
    match dispatched {
        Dispatched::Queued(job_id) => Ok(envelope(StatusCode::ACCEPTED, json!({ "jobId": job_id }))),
        other => Err(unexpected(operation, &other)),
    }
}

fn unexpected(operation: OperationName, dispatched: &Dispatched) -> ApiError {
    tracing::error!(%operation, ?dispatched, "unexpected dispatch result");
    ApiError::Internal
}

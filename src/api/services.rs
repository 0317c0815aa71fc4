use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};

use super::{
    models::{
        CountResponse, DeleteRequest, DeletedResponse, HealthResponse, ListQuery,
        NavigateRequest, RecordsResponse, SessionChangeResponse, StatusQuery, SubmitRequest,
        SubmitResponse,
    },
    state::AppState,
    utils::read_json,
    validation::{self, RequestValidationError},
};
use crate::api::error::ApiError;
use crate::store::RetentionPolicy;

/// Capture endpoint (POST /logs)
///
/// Validates the event, derives domain and session, and queues the record.
/// Responds 202 with the record id before the record is durable; it becomes
/// visible to queries after the next flush.
pub async fn submit_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let request: SubmitRequest = read_json(&headers, body, state.max_payload_bytes()).await?;
    validation::validate_submit(&request).map_err(map_validation_error)?;

    let id = state.service.submit(
        &request.level,
        &request.message,
        &request.args,
        &request.url,
        &request.context_id,
    )?;

    Ok((StatusCode::ACCEPTED, Json(SubmitResponse { id })))
}

/// Filtered, paginated records in ascending timestamp order (GET /logs)
pub async fn list_logs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = query.to_filter()?;
    let (limit, offset) = (query.limit(), query.offset());
    validation::validate_limit(limit).map_err(map_validation_error)?;

    let records = state.service.query(&filter, limit, offset)?;
    Ok(Json(RecordsResponse {
        records,
        limit,
        offset,
    }))
}

/// Number of records matching the same filters as `GET /logs`
pub async fn count_logs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let count = state.service.count(&query.to_filter()?)?;
    Ok(Json(CountResponse { count }))
}

pub async fn get_log(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.get(&id)?))
}

/// Delete records by id (POST /logs/delete). Unknown ids are ignored.
pub async fn delete_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let request: DeleteRequest = read_json(&headers, body, state.max_payload_bytes()).await?;
    validation::validate_delete(&request).map_err(map_validation_error)?;

    let deleted = state.service.delete_records(&request.ids)?;
    Ok(Json(DeletedResponse { deleted }))
}

/// Remove every record (DELETE /logs)
pub async fn clear_logs(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.clear_all()?))
}

pub async fn delete_domain(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.service.delete_by_domain(&domain)?;
    Ok(Json(DeletedResponse { deleted }))
}

pub async fn storage_usage(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.usage()?))
}

/// Quota standing (GET /storage/status?threshold=80)
pub async fn storage_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(threshold) = query.threshold {
        if !(1.0..=100.0).contains(&threshold) {
            return Err(ApiError::InvalidPayload(format!(
                "threshold must be within 1..=100, got {}",
                threshold
            )));
        }
    }
    Ok(Json(state.service.status(query.threshold).await?))
}

pub async fn storage_recommendations(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.recommendations().await?))
}

/// Manual cleanup (POST /storage/cleanup) with `{maxAgeMs?, maxSizeBytes?, maxEntries?}`
pub async fn storage_cleanup(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let policy: RetentionPolicy = read_json(&headers, body, state.max_payload_bytes()).await?;
    validation::validate_cleanup(&policy).map_err(map_validation_error)?;

    Ok(Json(state.service.cleanup(&policy)))
}

pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.sessions())
}

pub async fn close_session(
    State(state): State<AppState>,
    Path(context_id): Path<String>,
) -> impl IntoResponse {
    let ended = state.service.context_closed(&context_id);
    Json(SessionChangeResponse { context_id, ended })
}

pub async fn navigate_session(
    State(state): State<AppState>,
    Path(context_id): Path<String>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let request: NavigateRequest = read_json(&headers, body, state.max_payload_bytes()).await?;
    validation::validate_navigate(&request).map_err(map_validation_error)?;

    let ended = state.service.context_navigated(&context_id, &request.url);
    Ok(Json(SessionChangeResponse { context_id, ended }))
}

/// Health check endpoint (GET /health)
///
/// Reports the store and ingest pipeline. Returns 503 if any component is
/// unhealthy.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = HashMap::new();

    let store = match state.service.store().health_check() {
        Ok(()) => "healthy".to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "Store health check failed");
            "unhealthy".to_string()
        }
    };
    components.insert("store".to_string(), store);

    let stats = state.service.ingest_stats();
    components.insert("ingest".to_string(), "healthy".to_string());
    components.insert("ingest_pending".to_string(), stats.pending.to_string());

    let all_healthy = components
        .iter()
        .filter(|(name, _)| !name.ends_with("_pending"))
        .all(|(_, status)| status == "healthy");

    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy { "healthy" } else { "unhealthy" }.to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status_code, Json(response))
}

fn map_validation_error(err: RequestValidationError) -> ApiError {
    ApiError::InvalidPayload(err.to_string())
}

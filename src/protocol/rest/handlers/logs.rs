//! Audit Log Handlers

use std::sync::Arc;

use axum::{extract::Query, Extension, Json};

use crate::protocol::rest::dto::{ApiResponse, AuditLogDto, LogsQuery};
use crate::protocol::rest::error::RestError;
use crate::protocol::rest::AppState;

/// Most recent audit records, newest first
pub async fn list_logs(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<ApiResponse<AuditLogDto>>, RestError> {
    let limit = state.clamp_log_limit(query.limit);
    let records = state.orchestrator.audit_log(limit).await?;
    Ok(Json(ApiResponse::success(AuditLogDto { limit, records })))
}

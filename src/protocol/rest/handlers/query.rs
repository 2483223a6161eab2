//! Query Handlers
//!
//! Endpoint for ad-hoc statement execution.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::ConnectInfo, http::HeaderMap, Extension, Json};

use super::client_info;
use crate::orchestrator::QueryRequest;
use crate::protocol::rest::dto::{ExecuteQueryRequest, QueryResponse};
use crate::protocol::rest::{AppState, SessionContext};

/// Execute a statement as the session's actor.
///
/// Always answers 200: rejections, driver errors and timeouts are outcomes,
/// reported with `success: false`.
pub async fn execute_query(
    Extension(state): Extension<Arc<AppState>>,
    Extension(session): Extension<SessionContext>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<ExecuteQueryRequest>,
) -> Json<QueryResponse> {
    let client = client_info(&headers, connect_info.map(|ConnectInfo(addr)| addr));
    let report = state
        .orchestrator
        .execute(QueryRequest::new(session.actor, request.sql).with_client(client))
        .await;
    Json(report.into())
}

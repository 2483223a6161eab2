//! Admin Handlers
//!
//! Health check endpoint.

use std::sync::Arc;

use axum::{Extension, Json};

use crate::protocol::rest::dto::HealthDto;
use crate::protocol::rest::AppState;

/// Health check endpoint (no session required)
pub async fn health(Extension(state): Extension<Arc<AppState>>) -> Json<HealthDto> {
    Json(HealthDto {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_seconds(),
    })
}

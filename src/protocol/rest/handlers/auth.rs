//! Session Handlers
//!
//! Login (cookie issuance) and logout.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::ConnectInfo,
    http::{header, HeaderMap},
    response::IntoResponse,
    Extension, Json,
};

use super::{client_info, expired_cookie, session_cookie};
use crate::protocol::rest::dto::{ApiResponse, LoginDto, LoginRequest, LogoutDto};
use crate::protocol::rest::error::RestError;
use crate::protocol::rest::{AppState, SessionContext};

/// Check credentials and set the signed session cookie
pub async fn login(
    Extension(state): Extension<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, RestError> {
    let client = client_info(&headers, connect_info.map(|ConnectInfo(addr)| addr));
    let token = state
        .orchestrator
        .login(&request.username, &request.password, client)
        .await?;

    let cookie = session_cookie(&state.cookie_name, &state.signer.sign(&token));
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(ApiResponse::success(LoginDto {
            actor: request.username.trim().to_string(),
        })),
    ))
}

/// Revoke the current session and clear the cookie
pub async fn logout(
    Extension(state): Extension<Arc<AppState>>,
    Extension(session): Extension<SessionContext>,
) -> impl IntoResponse {
    let revoked = state.orchestrator.logout(&session.token);
    tracing::info!(actor = %session.actor, "logout");
    (
        [(header::SET_COOKIE, expired_cookie(&state.cookie_name))],
        Json(ApiResponse::success(LogoutDto { revoked })),
    )
}

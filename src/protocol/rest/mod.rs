//! HTTP API Module
//!
//! JSON endpoints for the console. Everything lives under the configured base
//! path except `/health`; every route but `login` needs a signed session
//! cookie.

pub mod dto;
pub mod error;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::Request,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::config::{AuditConfig, AuthConfig, HttpConfig};
use crate::orchestrator::{Actor, QueryOrchestrator};
use crate::session::CookieSigner;

use self::error::RestError;
use self::handlers::{admin, auth, autocomplete, logs, query};

/// Shared state behind every handler.
pub struct AppState {
    pub orchestrator: Arc<QueryOrchestrator>,
    pub catalog: Arc<Catalog>,
    pub signer: CookieSigner,
    pub cookie_name: String,
    pub default_log_limit: usize,
    pub max_log_limit: usize,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<QueryOrchestrator>,
        catalog: Arc<Catalog>,
        auth: &AuthConfig,
        audit: &AuditConfig,
    ) -> Self {
        Self {
            orchestrator,
            catalog,
            signer: CookieSigner::new(auth.session_secret.clone()),
            cookie_name: auth.session_cookie_name.clone(),
            default_log_limit: audit.default_log_limit,
            max_log_limit: audit.max_log_limit,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Caller's limit clamped to `[1, max_log_limit]`, default when absent.
    pub fn clamp_log_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_log_limit)
            .clamp(1, self.max_log_limit.max(1))
    }
}

/// Session attached to a request by [`require_session`].
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub actor: Actor,
    pub token: String,
}

/// Middleware: resolve the signed session cookie or answer 401.
async fn require_session(
    Extension(state): Extension<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let session = handlers::cookie_value(req.headers(), &state.cookie_name)
        .and_then(|value| state.signer.verify(&value).map(str::to_string))
        .and_then(|token| {
            state
                .orchestrator
                .sessions()
                .lookup(&token)
                .map(|info| SessionContext {
                    actor: Actor::new(info.actor),
                    token,
                })
        });

    match session {
        Some(session) => {
            req.extensions_mut().insert(session);
            next.run(req).await
        }
        None => {
            debug!(path = %req.uri().path(), "session_missing");
            RestError::auth_required().into_response()
        }
    }
}

/// Creates the Axum router
pub fn create_router(state: Arc<AppState>, config: &HttpConfig) -> Router {
    // Build CORS layer
    let cors = if !config.cors_origins.is_empty() {
        // Explicit origins configured: restrict to those
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|s| {
                let parsed = s.parse();
                if parsed.is_err() {
                    warn!(origin = %s, "invalid_cors_origin_ignored");
                }
                parsed.ok()
            })
            .collect();
        Some(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else if config.cors_allow_all {
        // Explicit dev mode opt-in: allow all origins
        Some(CorsLayer::permissive())
    } else {
        // Default: same-origin only
        None
    };

    let protected = Router::new()
        .route("/logout", post(auth::logout))
        .route("/execute-query", post(query::execute_query))
        .route("/logs", get(logs::list_logs))
        .route("/autocomplete", get(autocomplete::columns))
        .route("/autocomplete-tables", get(autocomplete::tables))
        .route_layer(middleware::from_fn(require_session));

    let console = Router::new()
        .route("/login", post(auth::login))
        .merge(protected);

    // Extension must be the OUTER layer so the session middleware can extract it.
    let mut app = Router::new()
        .route("/health", get(admin::health))
        .nest(config.base_path(), console)
        .layer(Extension(state));

    if let Some(cors) = cors {
        app = app.layer(cors);
    }

    app
}

/// Starts the HTTP server with graceful shutdown support.
///
/// Listens for SIGINT (ctrl-c) and SIGTERM to trigger graceful shutdown.
/// On shutdown: stops accepting connections and cancels the session reaper.
pub async fn start_http_server(
    state: Arc<AppState>,
    config: &HttpConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(Arc::clone(&state), config);

    // Cancellation channel for the session reaper
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);

    // Spawn background session reaper (runs every 60 seconds, stops on shutdown)
    let sessions = Arc::clone(state.orchestrator.sessions());
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let reaped = sessions.reap_expired();
                    if reaped > 0 {
                        info!(reaped, "expired_sessions_reaped");
                    }
                }
                _ = shutdown_rx.changed() => {
                    debug!("session_reaper_stopped");
                    break;
                }
            }
        }
    });

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    info!(%addr, base_path = config.base_path(), "http_server_listening");

    let socket = if addr.is_ipv4() {
        tokio::net::TcpSocket::new_v4()?
    } else {
        tokio::net::TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    let listener = socket.listen(1024)?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Signal reaper to stop
    let _ = shutdown_tx.send(true);
    info!("http_server_stopped");

    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    () = ctrl_c => info!("received_sigint_shutting_down"),
                    _ = sigterm.recv() => info!("received_sigterm_shutting_down"),
                }
            }
            Err(e) => {
                warn!(error = %e, "sigterm_handler_failed");
                ctrl_c.await;
                info!("received_sigint_shutting_down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
        info!("received_sigint_shutting_down");
    }
}

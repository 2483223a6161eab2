//! Query Orchestrator
//!
//! Use-case coordinator for one console request:
//!
//! ```text
//! RECEIVED ─▶ policy::admit ─┬─ Rejected ─────────────────────────▶ Failure{reason}
//!                            └─ Allowed ─▶ TimedExecutor::run ─┬──▶ Success
//!                                                              ├──▶ Failure
//!                                                              └──▶ Timeout
//! every terminal state ─▶ exactly one AuditRecorder::record ─▶ caller
//! ```
//!
//! Each request runs on its own task, so a caller that goes away mid-flight
//! does not cancel the execution or its audit record.
//!
//! Nothing raised inside the pipeline reaches the caller as an error; it is
//! folded into a [`QueryOutcome`]. The login path goes through the same
//! recorder with the `LOGIN` / `TENTATIVA_LOGIN` labels.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::audit::{
    AuditEntry, AuditRecord, AuditRecorder, ClientInfo, LOGIN_ATTEMPT_LABEL, LOGIN_LABEL,
};
use crate::auth::CredentialVerifier;
use crate::error::{ConsoleError, ConsoleResult};
use crate::execution::{QueryOutcome, TimedExecutor};
use crate::policy;
use crate::session::{SessionStore, SessionToken};
use crate::value::Params;

/// Label recorded when no session resolves to a user.
pub const UNKNOWN_ACTOR: &str = "unknown actor";

/// Message recorded and returned for a rejected login.
pub const INVALID_CREDENTIALS: &str = "invalid credentials";

/// Who a request is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Actor(String);

impl Actor {
    pub fn new(label: impl Into<String>) -> Self {
        Actor(label.into())
    }

    pub fn unknown() -> Self {
        Actor(UNKNOWN_ACTOR.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_ACTOR
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One submitted statement.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub actor: Actor,
    /// Executed and logged exactly as submitted.
    pub statement_text: String,
    pub bound_parameters: Option<Params>,
    pub client: ClientInfo,
    pub submitted_at: DateTime<Utc>,
    received: Instant,
}

impl QueryRequest {
    pub fn new(actor: Actor, statement_text: impl Into<String>) -> Self {
        Self {
            actor,
            statement_text: statement_text.into(),
            bound_parameters: None,
            client: ClientInfo::default(),
            submitted_at: Utc::now(),
            received: Instant::now(),
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.bound_parameters = Some(params);
        self
    }

    pub fn with_client(mut self, client: ClientInfo) -> Self {
        self.client = client;
        self
    }
}

/// Outcome plus the bookkeeping the HTTP layer reports alongside it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryReport {
    pub actor: Actor,
    #[serde(flatten)]
    pub outcome: QueryOutcome,
    /// From request receipt to outcome resolution, policy check included.
    pub elapsed_seconds: f64,
    pub row_count: usize,
}

pub struct QueryOrchestrator {
    pipeline: Pipeline,
}

impl QueryOrchestrator {
    pub fn new(
        executor: Arc<TimedExecutor>,
        recorder: AuditRecorder,
        sessions: Arc<dyn SessionStore>,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Self {
        Self {
            pipeline: Pipeline {
                executor,
                recorder,
                sessions,
                verifier,
            },
        }
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.pipeline.sessions
    }

    pub fn limit_secs(&self) -> u64 {
        self.pipeline.executor.limit_secs()
    }

    /// Run one request and audit it. Never fails.
    pub async fn handle(&self, request: QueryRequest) -> QueryOutcome {
        self.execute(request).await.outcome
    }

    /// Same as [`handle`](Self::handle), also returning actor, timing and row count.
    ///
    /// The pipeline runs on its own task: dropping the returned future
    /// abandons the wait, not the request, which still resolves and is audited.
    pub async fn execute(&self, request: QueryRequest) -> QueryReport {
        let actor = request.actor.clone();
        let received = request.received;
        let pipeline = self.pipeline.clone();

        match tokio::spawn(async move { pipeline.execute(request).await }).await {
            Ok(report) => report,
            Err(join_err) => {
                error!(actor = %actor, error = %join_err, "statement_pipeline_aborted");
                QueryReport {
                    actor,
                    outcome: QueryOutcome::Failure {
                        error_message: format!("Internal error: {join_err}"),
                    },
                    elapsed_seconds: received.elapsed().as_secs_f64(),
                    row_count: 0,
                }
            }
        }
    }

    /// Check credentials and open a session. Both paths are audited.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        client: ClientInfo,
    ) -> ConsoleResult<SessionToken> {
        let username = username.trim().to_string();
        let password = password.to_string();
        let actor = username.clone();
        let pipeline = self.pipeline.clone();

        match tokio::spawn(async move { pipeline.login(username, password, client).await }).await
        {
            Ok(result) => result,
            Err(join_err) => {
                error!(actor = %actor, error = %join_err, "login_pipeline_aborted");
                Err(ConsoleError::AuthFailure {
                    reason: INVALID_CREDENTIALS.to_string(),
                })
            }
        }
    }

    /// End a session. Returns whether the token was live.
    pub fn logout(&self, token: &str) -> bool {
        self.pipeline.sessions.revoke(token)
    }

    /// Actor behind a session token, or the unknown-actor label.
    pub fn session_actor(&self, token: Option<&str>) -> Actor {
        token
            .and_then(|t| self.pipeline.sessions.lookup(t))
            .map_or_else(Actor::unknown, |info| Actor::new(info.actor))
    }

    /// Newest audit records first.
    pub async fn audit_log(&self, limit: usize) -> ConsoleResult<Vec<AuditRecord>> {
        self.pipeline.recorder.store().recent(limit).await
    }
}

/// Everything one request needs, owned so it can run detached from the caller.
#[derive(Clone)]
struct Pipeline {
    executor: Arc<TimedExecutor>,
    recorder: AuditRecorder,
    sessions: Arc<dyn SessionStore>,
    verifier: Arc<dyn CredentialVerifier>,
}

impl Pipeline {
    async fn execute(self, request: QueryRequest) -> QueryReport {
        let QueryRequest {
            actor,
            statement_text,
            bound_parameters,
            client,
            received,
            ..
        } = request;

        let outcome = match policy::admit(&statement_text).into_result() {
            Err(rejection) => {
                warn!(actor = %actor, reason = %rejection, "statement_rejected");
                QueryOutcome::from(rejection)
            }
            Ok(()) => {
                info!(actor = %actor, "statement_executing");
                self.executor
                    .run(&statement_text, bound_parameters.as_ref())
                    .await
            }
        };
        let elapsed_seconds = received.elapsed().as_secs_f64();

        let entry = match outcome.error_message() {
            None => AuditEntry::success(actor.as_str(), statement_text),
            Some(message) => AuditEntry::error(actor.as_str(), statement_text, message),
        };
        self.recorder
            .record(entry.with_client(client).with_elapsed(elapsed_seconds))
            .await;

        info!(
            actor = %actor,
            success = outcome.is_success(),
            rows = outcome.row_count(),
            elapsed_ms = (elapsed_seconds * 1000.0) as u64,
            "statement_resolved"
        );

        QueryReport {
            actor,
            row_count: outcome.row_count(),
            outcome,
            elapsed_seconds,
        }
    }

    async fn login(
        self,
        username: String,
        password: String,
        client: ClientInfo,
    ) -> ConsoleResult<SessionToken> {
        let started = Instant::now();
        let verified = !username.is_empty() && self.verifier.verify(&username, &password).await;
        let elapsed = started.elapsed().as_secs_f64();

        if verified {
            let token = self.sessions.issue(&username);
            self.recorder
                .record(
                    AuditEntry::success(username.as_str(), LOGIN_LABEL)
                        .with_client(client)
                        .with_elapsed(elapsed),
                )
                .await;
            info!(actor = %username, "login_succeeded");
            Ok(token)
        } else {
            self.recorder
                .record(
                    AuditEntry::error(username.as_str(), LOGIN_ATTEMPT_LABEL, INVALID_CREDENTIALS)
                        .with_client(client)
                        .with_elapsed(elapsed),
                )
                .await;
            warn!(actor = %username, "login_failed");
            Err(ConsoleError::AuthFailure {
                reason: INVALID_CREDENTIALS.to_string(),
            })
        }
    }
}

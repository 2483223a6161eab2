//! Audit Trail
//!
//! One immutable record per execution attempt (queries and logins alike).
//!
//! ```text
//! QueryOrchestrator ──record()──▶ AuditRecorder ──append()──▶ dyn AuditStore
//!                                     │                         ├── SqlAuditStore (table)
//!                                     └── failures → tracing    └── InMemoryAuditStore
//! ```
//!
//! [`AuditRecorder::record`] has a non-failing contract: store errors, a
//! panicking store and a store that never answers are routed to the
//! operational log and swallowed. Auditing can never stop or stall a query
//! result on its way to the caller.

mod memory;
mod sql;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::ConsoleResult;

pub use memory::InMemoryAuditStore;
pub use sql::SqlAuditStore;

/// Statement label recorded for a successful login.
pub const LOGIN_LABEL: &str = "LOGIN";

/// Statement label recorded for a rejected login attempt.
pub const LOGIN_ATTEMPT_LABEL: &str = "TENTATIVA_LOGIN";

/// Outcome class stored with each record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditStatus {
    Success,
    Error,
}

impl AuditStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditStatus::Success => "SUCCESS",
            AuditStatus::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SUCCESS" => Ok(AuditStatus::Success),
            "ERROR" => Ok(AuditStatus::Error),
            _ => Err(format!("Unknown audit status '{s}'")),
        }
    }
}

/// Where a request came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    pub address: Option<String>,
    pub agent: Option<String>,
}

/// Everything the recorder writes; id and timestamp are assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub actor: String,
    pub statement_text: String,
    pub client: ClientInfo,
    pub status: AuditStatus,
    pub error_message: Option<String>,
    pub elapsed_seconds: Option<f64>,
}

impl AuditEntry {
    pub fn success(actor: impl Into<String>, statement_text: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            statement_text: statement_text.into(),
            client: ClientInfo::default(),
            status: AuditStatus::Success,
            error_message: None,
            elapsed_seconds: None,
        }
    }

    pub fn error(
        actor: impl Into<String>,
        statement_text: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status: AuditStatus::Error,
            error_message: Some(message.into()),
            ..Self::success(actor, statement_text)
        }
    }

    pub fn with_client(mut self, client: ClientInfo) -> Self {
        self.client = client;
        self
    }

    pub fn with_elapsed(mut self, seconds: f64) -> Self {
        self.elapsed_seconds = Some(seconds);
        self
    }
}

/// A persisted audit record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub id: i64,
    pub actor: String,
    pub statement_text: String,
    pub client_address: Option<String>,
    pub client_agent: Option<String>,
    pub status: AuditStatus,
    pub error_message: Option<String>,
    pub elapsed_seconds: Option<f64>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn from_entry(id: i64, entry: AuditEntry, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id,
            actor: entry.actor,
            statement_text: entry.statement_text,
            client_address: entry.client.address,
            client_agent: entry.client.agent,
            status: entry.status,
            error_message: entry.error_message,
            elapsed_seconds: entry.elapsed_seconds,
            occurred_at,
        }
    }
}

/// Append-only audit persistence.
#[async_trait]
pub trait AuditStore: Send + Sync + 'static {
    /// Persist one entry. Records are never updated or deleted afterwards.
    async fn append(&self, entry: &AuditEntry) -> ConsoleResult<()>;

    /// Most recent records first, at most `limit`.
    async fn recent(&self, limit: usize) -> ConsoleResult<Vec<AuditRecord>>;
}

/// How long [`AuditRecorder::record`] waits for a store before giving up.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Non-failing front for an [`AuditStore`].
#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
    write_timeout: Duration,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            store,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Write one entry. Never fails and never panics into the caller.
    ///
    /// The write runs on its own task so a panicking store surfaces as a join
    /// error here instead of unwinding through the request. The caller waits at
    /// most `write_timeout`; a slower write is left running detached.
    pub async fn record(&self, entry: AuditEntry) {
        let store = Arc::clone(&self.store);
        let actor = entry.actor.clone();
        let status = entry.status;
        let write = tokio::spawn(async move { store.append(&entry).await });

        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(Ok(Ok(()))) => debug!(actor = %actor, status = %status, "audit_recorded"),
            Ok(Ok(Err(e))) => {
                error!(actor = %actor, status = %status, error = %e, "audit_write_failed")
            }
            Ok(Err(join_err)) => {
                error!(actor = %actor, status = %status, error = %join_err, "audit_write_aborted");
            }
            Err(_) => {
                error!(
                    actor = %actor,
                    status = %status,
                    timeout_secs = self.write_timeout.as_secs_f64(),
                    error = "audit store did not answer in time",
                    "audit_write_failed"
                );
            }
        }
    }
}

//! Audit table in the console's own database.
//!
//! Writes go through the [`TimedExecutor`] like every other statement, with
//! every value bound as a parameter. The table name comes from configuration
//! and is checked as a plain identifier because it cannot be bound.

use std::sync::Arc;

use async_trait::async_trait;

use super::{AuditEntry, AuditRecord, AuditStatus, AuditStore};
use crate::error::{ConsoleError, ConsoleResult};
use crate::execution::TimedExecutor;
use crate::value::{is_plain_identifier, Params, Scalar};

pub struct SqlAuditStore {
    executor: Arc<TimedExecutor>,
    table: String,
}

impl SqlAuditStore {
    pub fn new(executor: Arc<TimedExecutor>, table: impl Into<String>) -> ConsoleResult<Self> {
        let table = table.into();
        if !is_plain_identifier(&table) {
            return Err(ConsoleError::InvalidIdentifier(table));
        }
        Ok(Self { executor, table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn create_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                actor TEXT NOT NULL,
                statement_text TEXT NOT NULL,
                client_address TEXT,
                client_agent TEXT,
                status TEXT NOT NULL CHECK (status IN ('SUCCESS', 'ERROR')),
                error_message TEXT,
                elapsed_seconds DOUBLE PRECISION,
                occurred_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            self.table
        )
    }

    fn insert_sql(&self) -> String {
        // NULL parameters arrive typed as text; the cast keeps the numeric column happy.
        format!(
            "INSERT INTO {} (actor, statement_text, client_address, client_agent, status, error_message, elapsed_seconds) \
             VALUES ($1, $2, $3, $4, $5, $6, $7::double precision)",
            self.table
        )
    }

    fn recent_sql(&self) -> String {
        format!(
            "SELECT id, actor, statement_text, client_address, client_agent, status, error_message, elapsed_seconds, occurred_at \
             FROM {} ORDER BY occurred_at DESC, id DESC LIMIT $1",
            self.table
        )
    }

    /// Create the audit table when missing.
    pub async fn ensure_table(&self) -> ConsoleResult<()> {
        self.executor
            .execute(&self.create_sql(), Params::new())
            .await
            .map_err(|e| ConsoleError::AuditWriteFailure {
                message: e.to_string(),
            })?;
        Ok(())
    }
}

fn insert_params(entry: &AuditEntry) -> Params {
    Params::new()
        .with("actor", entry.actor.as_str())
        .with("statement_text", entry.statement_text.as_str())
        .with("client_address", entry.client.address.clone())
        .with("client_agent", entry.client.agent.clone())
        .with("status", entry.status.as_str())
        .with("error_message", entry.error_message.clone())
        .with("elapsed_seconds", entry.elapsed_seconds)
}

fn malformed(what: &str) -> ConsoleError {
    ConsoleError::ExecutionFailure {
        message: format!("Malformed audit row: {what}"),
    }
}

fn record_from_row(row: Vec<Scalar>) -> ConsoleResult<AuditRecord> {
    let [id, actor, statement_text, client_address, client_agent, status, error_message, elapsed, occurred_at]: [Scalar; 9] =
        row.try_into().map_err(|_| malformed("expected 9 columns"))?;

    Ok(AuditRecord {
        id: id.as_i64().ok_or_else(|| malformed("id"))?,
        actor: actor.into_text().unwrap_or_default(),
        statement_text: statement_text.into_text().unwrap_or_default(),
        client_address: client_address.into_text(),
        client_agent: client_agent.into_text(),
        status: status
            .as_str()
            .and_then(|s| s.parse::<AuditStatus>().ok())
            .ok_or_else(|| malformed("status"))?,
        error_message: error_message.into_text(),
        elapsed_seconds: elapsed.as_f64(),
        occurred_at: occurred_at
            .as_timestamp()
            .ok_or_else(|| malformed("occurred_at"))?,
    })
}

#[async_trait]
impl AuditStore for SqlAuditStore {
    async fn append(&self, entry: &AuditEntry) -> ConsoleResult<()> {
        self.executor
            .execute(&self.insert_sql(), insert_params(entry))
            .await
            .map_err(|e| ConsoleError::AuditWriteFailure {
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> ConsoleResult<Vec<AuditRecord>> {
        let rows = self
            .executor
            .fetch(&self.recent_sql(), Params::new().with("limit", limit))
            .await?;
        rows.rows.into_iter().map(record_from_row).collect()
    }
}

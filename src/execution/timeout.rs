//! Timed Executor
//!
//! Runs one database round-trip on a dedicated worker task and waits for it
//! for at most `limit_secs`.
//!
//! ## Design
//!
//! Each call:
//! 1. spawns a fresh tokio task that opens a connection, runs the statement,
//!    and closes the connection,
//! 2. races the task's `JoinHandle` against a deadline timer.
//!
//! ## Timeouts abandon, they do not cancel
//!
//! When the deadline fires the caller receives a timeout and moves on, but the
//! worker is *detached*, not aborted: dropping a `JoinHandle` leaves the task
//! running. The statement may keep executing on the server (and holding its
//! connection) until it finishes or the server's own session/network timeout
//! kills it. Size `query.timeout_secs` and the database role's
//! `statement_timeout` with that in mind.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{ExecutionError, ExecutionResult, QueryOutcome};
use crate::database::{Connector, DbError, RowSet};
use crate::value::Params;

/// Timeout error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Timeout: query exceeded the time limit of {limit_secs} seconds")]
pub struct TimeoutError {
    /// The configured limit that was exceeded
    pub limit_secs: u64,
}

/// Bounded-time runner for single database calls.
///
/// Opens and releases one connection per invocation; workers are never shared
/// between calls.
pub struct TimedExecutor {
    connector: Arc<dyn Connector>,
    limit_secs: u64,
}

impl TimedExecutor {
    pub fn new(connector: Arc<dyn Connector>, limit_secs: u64) -> Self {
        TimedExecutor {
            connector,
            limit_secs,
        }
    }

    /// Configured limit in seconds.
    pub fn limit_secs(&self) -> u64 {
        self.limit_secs
    }

    /// Run a query and fold the result into a [`QueryOutcome`].
    ///
    /// Never returns a fault: driver errors become `Failure`, a missed deadline
    /// becomes `Timeout { limit_seconds }`.
    pub async fn run(&self, sql: &str, params: Option<&Params>) -> QueryOutcome {
        self.fetch(sql, params.cloned().unwrap_or_default())
            .await
            .into()
    }

    /// Run a query and return its rows. Used by internal lookups.
    pub async fn fetch(&self, sql: &str, params: Params) -> ExecutionResult<RowSet> {
        let connector = Arc::clone(&self.connector);
        let sql = sql.to_owned();
        self.bounded(async move {
            let mut conn = connector.connect().await?;
            let result = conn.fetch(&sql, &params).await;
            if let Err(e) = conn.close().await {
                debug!(error = %e, "db_close_failed");
            }
            result
        })
        .await
    }

    /// Run a non-query statement and commit it. Returns affected rows.
    pub async fn execute(&self, sql: &str, params: Params) -> ExecutionResult<u64> {
        let connector = Arc::clone(&self.connector);
        let sql = sql.to_owned();
        self.bounded(async move {
            let mut conn = connector.connect().await?;
            let result = conn.execute(&sql, &params).await;
            if let Err(e) = conn.close().await {
                debug!(error = %e, "db_close_failed");
            }
            result
        })
        .await
    }

    async fn bounded<T, F>(&self, work: F) -> ExecutionResult<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, DbError>> + Send + 'static,
    {
        let started = Instant::now();
        let worker = tokio::spawn(work);

        match tokio::time::timeout(Duration::from_secs(self.limit_secs), worker).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(db_err))) => Err(ExecutionError::Failed(db_err.to_string())),
            Ok(Err(join_err)) => Err(ExecutionError::Failed(format!(
                "Query worker stopped unexpectedly: {join_err}"
            ))),
            Err(_elapsed) => {
                // The JoinHandle is dropped here: the worker is detached, not aborted.
                warn!(
                    limit_secs = self.limit_secs,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "query_timeout_worker_abandoned"
                );
                Err(TimeoutError {
                    limit_secs: self.limit_secs,
                }
                .into())
            }
        }
    }
}

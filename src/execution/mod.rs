//! Query Execution Module
//!
//! Provides bounded-time statement execution:
//! - [`TimedExecutor`] runs one statement on its own worker task and races it
//!   against a deadline
//! - [`QueryOutcome`] is the tagged result handed back to callers

mod timeout;

use serde::Serialize;

use crate::database::RowSet;
use crate::error::ConsoleError;
use crate::value::Scalar;

pub use timeout::{TimedExecutor, TimeoutError};

/// Execution error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    /// Query did not finish within the limit
    #[error("{0}")]
    Timeout(#[from] TimeoutError),

    /// Driver or worker failure, message is shown to the actor
    #[error("{0}")]
    Failed(String),
}

/// Result type for execution operations
pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Result of one query attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome {
    /// Column names in projection order and rows in database order.
    /// Every row has exactly `columns.len()` cells.
    Success {
        columns: Vec<String>,
        rows: Vec<Vec<Scalar>>,
    },
    Failure {
        error_message: String,
    },
    Timeout {
        limit_seconds: u64,
    },
}

impl QueryOutcome {
    /// Build a success, refusing row sets whose rows do not match the column count.
    pub fn from_rows(row_set: RowSet) -> Self {
        if let Some(index) = row_set.first_ragged_row() {
            return QueryOutcome::Failure {
                error_message: format!(
                    "Malformed result: row {index} has {} cells, expected {}",
                    row_set.rows[index].len(),
                    row_set.columns.len()
                ),
            };
        }
        QueryOutcome::Success {
            columns: row_set.columns,
            rows: row_set.rows,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, QueryOutcome::Success { .. })
    }

    pub fn row_count(&self) -> usize {
        match self {
            QueryOutcome::Success { rows, .. } => rows.len(),
            _ => 0,
        }
    }

    /// Message describing a non-success outcome; timeouts get a fixed text naming the limit.
    pub fn error_message(&self) -> Option<String> {
        match self {
            QueryOutcome::Success { .. } => None,
            QueryOutcome::Failure { error_message } => Some(error_message.clone()),
            QueryOutcome::Timeout { limit_seconds } => Some(
                ConsoleError::ExecutionTimeout {
                    limit_secs: *limit_seconds,
                }
                .to_string(),
            ),
        }
    }
}

impl From<ConsoleError> for QueryOutcome {
    fn from(err: ConsoleError) -> Self {
        match err {
            ConsoleError::ExecutionTimeout { limit_secs } => QueryOutcome::Timeout {
                limit_seconds: limit_secs,
            },
            other => QueryOutcome::Failure {
                error_message: other.to_string(),
            },
        }
    }
}

impl From<ExecutionResult<RowSet>> for QueryOutcome {
    fn from(result: ExecutionResult<RowSet>) -> Self {
        match result {
            Ok(rows) => QueryOutcome::from_rows(rows),
            Err(ExecutionError::Timeout(t)) => QueryOutcome::Timeout {
                limit_seconds: t.limit_secs,
            },
            Err(ExecutionError::Failed(error_message)) => QueryOutcome::Failure { error_message },
        }
    }
}

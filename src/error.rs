//! Error taxonomy for the console core.
//!
//! Inside the query pipeline these errors are folded into a
//! [`QueryOutcome`](crate::execution::QueryOutcome) before they reach a caller;
//! only the login path and the administrative views return them as `Err`.

use crate::database::DbError;
use crate::execution::ExecutionError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConsoleError {
    /// Statement failed the read-only check
    #[error("{reason}")]
    PolicyViolation { reason: String },

    /// The database raised while running the statement
    #[error("{message}")]
    ExecutionFailure { message: String },

    /// The worker did not answer within the configured limit
    #[error("Timeout: query exceeded the time limit of {limit_secs} seconds")]
    ExecutionTimeout { limit_secs: u64 },

    /// Audit persistence failed (operational only, never shown to the actor)
    #[error("Audit write failed: {message}")]
    AuditWriteFailure { message: String },

    /// Bad credentials or missing session
    #[error("Authentication failed: {reason}")]
    AuthFailure { reason: String },

    /// A name that must be spliced into SQL text is not a plain identifier
    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for console operations
pub type ConsoleResult<T> = Result<T, ConsoleError>;

impl From<ExecutionError> for ConsoleError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Failed(message) => ConsoleError::ExecutionFailure { message },
            ExecutionError::Timeout(t) => ConsoleError::ExecutionTimeout {
                limit_secs: t.limit_secs,
            },
        }
    }
}

impl From<DbError> for ConsoleError {
    fn from(err: DbError) -> Self {
        ConsoleError::ExecutionFailure {
            message: err.to_string(),
        }
    }
}

impl From<figment::Error> for ConsoleError {
    fn from(err: figment::Error) -> Self {
        ConsoleError::Config(err.to_string())
    }
}

//! Database Access
//!
//! The console talks to its backing store through two small traits:
//!
//! - [`Connector`] opens one fresh connection per call. There is no pool; each
//!   execution owns its connection from open to close.
//! - [`Connection`] runs parameterised statements, exposes result column names
//!   and commits non-query statements.
//!
//! [`postgres::PgConnector`] is the production implementation.

pub mod postgres;

use async_trait::async_trait;
use serde::Serialize;

use crate::value::{Params, Scalar};

pub use postgres::PgConnector;

/// Driver-level failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DbError {
    /// Could not open a connection
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Statement was rejected or failed server-side (message is the driver's)
    #[error("{0}")]
    Statement(String),

    /// Transaction could not be committed
    #[error("Commit failed: {0}")]
    Commit(String),

    /// A result cell could not be converted
    #[error("Cannot decode column '{column}': {message}")]
    Decode { column: String, message: String },
}

/// Column names in projection order plus rows in the order the database returned them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Scalar>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Scalar>>) -> Self {
        Self { columns, rows }
    }

    /// Index of the first row whose width differs from the column count.
    pub fn first_ragged_row(&self) -> Option<usize> {
        let width = self.columns.len();
        self.rows.iter().position(|row| row.len() != width)
    }
}

/// One open database session.
#[async_trait]
pub trait Connection: Send {
    /// Run a statement and fetch every row.
    async fn fetch(&mut self, sql: &str, params: &Params) -> Result<RowSet, DbError>;

    /// Run a non-query statement inside a transaction and commit it.
    async fn execute(&mut self, sql: &str, params: &Params) -> Result<u64, DbError>;

    /// Release the connection. Further calls on a closed connection fail.
    async fn close(&mut self) -> Result<(), DbError>;
}

/// Factory for fresh connections.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Box<dyn Connection>, DbError>;
}

/// Mask the password portion of a connection URL for logging.
pub fn mask_database_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let rest = &url[scheme_end + 3..];
    let Some(at) = rest.rfind('@') else {
        return url.to_string();
    };
    let credentials = &rest[..at];
    match credentials.find(':') {
        Some(colon) => format!(
            "{}{}:***{}",
            &url[..scheme_end + 3],
            &credentials[..colon],
            &rest[at..]
        ),
        None => url.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted connectors for unit tests.

    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Clone)]
    pub enum Script {
        Rows(RowSet),
        Fail(String),
        Delay(Duration, RowSet),
        Hang,
        RefuseConnect(String),
    }

    /// Every statement seen by the connector, with its parameters.
    #[derive(Default)]
    pub struct Journal {
        pub statements: Mutex<Vec<(String, Params)>>,
        pub connects: Mutex<usize>,
        pub closes: Mutex<usize>,
    }

    pub struct ScriptedConnector {
        pub script: Mutex<Vec<Script>>,
        pub fallback: Script,
        pub journal: Arc<Journal>,
    }

    impl ScriptedConnector {
        pub fn always(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(Vec::new()),
                fallback: script,
                journal: Arc::new(Journal::default()),
            })
        }

        pub fn sequence(mut steps: Vec<Script>, fallback: Script) -> Arc<Self> {
            steps.reverse();
            Arc::new(Self {
                script: Mutex::new(steps),
                fallback,
                journal: Arc::new(Journal::default()),
            })
        }

        fn next(&self) -> Script {
            self.script.lock().pop().unwrap_or_else(|| self.fallback.clone())
        }
    }

    struct ScriptedConnection {
        script: Script,
        journal: Arc<Journal>,
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self) -> Result<Box<dyn Connection>, DbError> {
            let script = self.next();
            *self.journal.connects.lock() += 1;
            if let Script::RefuseConnect(message) = script {
                return Err(DbError::Connect(message));
            }
            Ok(Box::new(ScriptedConnection {
                script,
                journal: Arc::clone(&self.journal),
            }))
        }
    }

    #[async_trait]
    impl Connection for ScriptedConnection {
        async fn fetch(&mut self, sql: &str, params: &Params) -> Result<RowSet, DbError> {
            self.journal
                .statements
                .lock()
                .push((sql.to_string(), params.clone()));
            match &self.script {
                Script::Rows(rows) => Ok(rows.clone()),
                Script::Fail(message) => Err(DbError::Statement(message.clone())),
                Script::Delay(delay, rows) => {
                    tokio::time::sleep(*delay).await;
                    Ok(rows.clone())
                }
                Script::Hang => std::future::pending().await,
                Script::RefuseConnect(message) => Err(DbError::Connect(message.clone())),
            }
        }

        async fn execute(&mut self, sql: &str, params: &Params) -> Result<u64, DbError> {
            self.fetch(sql, params).await.map(|_| 1)
        }

        async fn close(&mut self) -> Result<(), DbError> {
            *self.journal.closes.lock() += 1;
            Ok(())
        }
    }

    pub fn rows(columns: &[&str], rows: Vec<Vec<Scalar>>) -> RowSet {
        RowSet::new(columns.iter().map(|c| (*c).to_string()).collect(), rows)
    }
}

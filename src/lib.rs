//! # SQL Console
//!
//! Core of a browser-based ad-hoc SQL console: authenticated users submit
//! read-only statements against a shared PostgreSQL database, every attempt
//! is bounded in time and recorded in an append-only audit trail.
//!
//! ## Request Pipeline
//!
//! ```text
//! HTTP request (protocol::rest)
//!     ↓
//! [Session lookup]          → Actor (or "unknown actor")
//!     ↓
//! [QueryOrchestrator]
//!     ├── policy::admit     → Rejected{reason}  (fail fast)
//!     ├── TimedExecutor     → Success | Failure | Timeout
//!     └── AuditRecorder     → exactly one record, never fails the request
//!     ↓
//! QueryOutcome (JSON)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use sql_console::{
//!     Actor, AuditRecorder, Config, DirectoryVerifier, InMemorySessionStore,
//!     PgConnector, QueryOrchestrator, QueryRequest, SqlAuditStore, TimedExecutor,
//! };
//!
//! let config = Config::load()?;
//! let connector = Arc::new(PgConnector::new(
//!     config.database.url.clone(),
//!     Duration::from_secs(config.database.connect_timeout_secs),
//! ));
//! let executor = Arc::new(TimedExecutor::new(connector, config.query.timeout_secs));
//! let audit = Arc::new(SqlAuditStore::new(executor.clone(), "query_audit_log")?);
//! let orchestrator = QueryOrchestrator::new(
//!     executor.clone(),
//!     AuditRecorder::new(audit),
//!     Arc::new(InMemorySessionStore::default()),
//!     Arc::new(DirectoryVerifier::new(executor, &config.auth.credential_query, "plsql")),
//! );
//!
//! let outcome = orchestrator
//!     .handle(QueryRequest::new(Actor::new("ANA"), "SELECT * FROM orders"))
//!     .await;
//! ```

pub mod audit;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod execution;
pub mod orchestrator;
pub mod policy;
pub mod protocol;
pub mod session;
pub mod value;

pub use audit::{
    AuditEntry, AuditRecord, AuditRecorder, AuditStatus, AuditStore, ClientInfo,
    InMemoryAuditStore, SqlAuditStore,
};
pub use auth::{CredentialVerifier, DirectoryVerifier};
pub use catalog::{Catalog, ColumnInfo, TableMatches, TableRef};
pub use config::Config;
pub use database::{Connection, Connector, DbError, PgConnector, RowSet};
pub use error::{ConsoleError, ConsoleResult};
pub use execution::{ExecutionError, QueryOutcome, TimedExecutor, TimeoutError};
pub use orchestrator::{Actor, QueryOrchestrator, QueryReport, QueryRequest, UNKNOWN_ACTOR};
pub use policy::{admit, Admission};
pub use session::{CookieSigner, InMemorySessionStore, SessionInfo, SessionStore};
pub use value::{Params, Scalar};

//! Shared fixtures: a scripted database and ready-made console wiring.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use sql_console::audit::{AuditRecorder, AuditStore, InMemoryAuditStore};
use sql_console::auth::CredentialVerifier;
use sql_console::database::{Connection, Connector, DbError, RowSet};
use sql_console::session::InMemorySessionStore;
use sql_console::value::{Params, Scalar};
use sql_console::{QueryOrchestrator, TimedExecutor};

/// What the next connection does.
#[derive(Clone)]
pub enum Step {
    Rows(RowSet),
    Fail(String),
    Sleep(Duration, RowSet),
    Hang,
}

/// Connector that replays a script and records every statement.
pub struct FakeDb {
    steps: Mutex<Vec<Step>>,
    fallback: Step,
    pub seen: Arc<Mutex<Vec<(String, Params)>>>,
    pub closes: Arc<Mutex<usize>>,
}

impl FakeDb {
    pub fn answering(step: Step) -> Arc<Self> {
        Self::scripted(Vec::new(), step)
    }

    /// `steps` are consumed in order, then `fallback` repeats.
    pub fn scripted(mut steps: Vec<Step>, fallback: Step) -> Arc<Self> {
        steps.reverse();
        Arc::new(Self {
            steps: Mutex::new(steps),
            fallback,
            seen: Arc::new(Mutex::new(Vec::new())),
            closes: Arc::new(Mutex::new(0)),
        })
    }

    pub fn statements(&self) -> Vec<String> {
        self.seen.lock().iter().map(|(sql, _)| sql.clone()).collect()
    }
}

struct FakeConnection {
    step: Step,
    seen: Arc<Mutex<Vec<(String, Params)>>>,
    closes: Arc<Mutex<usize>>,
}

#[async_trait]
impl Connector for FakeDb {
    async fn connect(&self) -> Result<Box<dyn Connection>, DbError> {
        let step = self.steps.lock().pop().unwrap_or_else(|| self.fallback.clone());
        Ok(Box::new(FakeConnection {
            step,
            seen: Arc::clone(&self.seen),
            closes: Arc::clone(&self.closes),
        }))
    }
}

#[async_trait]
impl Connection for FakeConnection {
    async fn fetch(&mut self, sql: &str, params: &Params) -> Result<RowSet, DbError> {
        self.seen.lock().push((sql.to_string(), params.clone()));
        match &self.step {
            Step::Rows(rows) => Ok(rows.clone()),
            Step::Fail(message) => Err(DbError::Statement(message.clone())),
            Step::Sleep(delay, rows) => {
                tokio::time::sleep(*delay).await;
                Ok(rows.clone())
            }
            Step::Hang => std::future::pending().await,
        }
    }

    async fn execute(&mut self, sql: &str, params: &Params) -> Result<u64, DbError> {
        self.fetch(sql, params).await.map(|_| 1)
    }

    async fn close(&mut self) -> Result<(), DbError> {
        *self.closes.lock() += 1;
        Ok(())
    }
}

pub fn row_set(columns: &[&str], rows: Vec<Vec<Scalar>>) -> RowSet {
    RowSet::new(columns.iter().map(|c| (*c).to_string()).collect(), rows)
}

/// 3 rows × 2 columns.
pub fn three_users() -> RowSet {
    row_set(
        &["id", "name"],
        vec![
            vec![Scalar::Int(1), Scalar::Text("ana".into())],
            vec![Scalar::Int(2), Scalar::Text("bruno".into())],
            vec![Scalar::Int(3), Scalar::Null],
        ],
    )
}

/// Accepts exactly one username/password pair.
pub struct OneUser {
    pub username: &'static str,
    pub password: &'static str,
}

#[async_trait]
impl CredentialVerifier for OneUser {
    async fn verify(&self, username: &str, password: &str) -> bool {
        username == self.username && password == self.password
    }
}

pub struct Console {
    pub db: Arc<FakeDb>,
    pub audit: Arc<InMemoryAuditStore>,
    pub executor: Arc<TimedExecutor>,
    pub orchestrator: Arc<QueryOrchestrator>,
}

pub fn console(db: Arc<FakeDb>, limit_secs: u64) -> Console {
    let audit = Arc::new(InMemoryAuditStore::default());
    console_with_store(db, limit_secs, audit.clone(), audit)
}

pub fn console_with_store(
    db: Arc<FakeDb>,
    limit_secs: u64,
    store: Arc<dyn AuditStore>,
    audit: Arc<InMemoryAuditStore>,
) -> Console {
    let executor = Arc::new(TimedExecutor::new(Arc::clone(&db) as Arc<dyn Connector>, limit_secs));
    let orchestrator = Arc::new(QueryOrchestrator::new(
        Arc::clone(&executor),
        AuditRecorder::new(store),
        Arc::new(InMemorySessionStore::default()),
        Arc::new(OneUser {
            username: "ana",
            password: "s3cret",
        }),
    ));
    Console {
        db,
        audit,
        executor,
        orchestrator,
    }
}

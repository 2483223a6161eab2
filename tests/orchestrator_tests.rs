//! End-to-end pipeline tests: policy → executor → audit, through the public API.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{console, console_with_store, row_set, three_users, FakeDb, Step};

use sql_console::audit::{
    AuditEntry, AuditRecord, AuditStatus, AuditStore, ClientInfo, InMemoryAuditStore,
    LOGIN_ATTEMPT_LABEL, LOGIN_LABEL,
};
use sql_console::auth::DirectoryVerifier;
use sql_console::policy::READ_ONLY_REASON;
use sql_console::session::{InMemorySessionStore, SessionStore};
use sql_console::value::Scalar;
use sql_console::{
    Actor, AuditRecorder, ConsoleError, ConsoleResult, QueryOrchestrator, QueryOutcome,
    QueryRequest, TimedExecutor, UNKNOWN_ACTOR,
};

fn request(sql: &str) -> QueryRequest {
    QueryRequest::new(Actor::new("ana"), sql)
}

// === Query path ===

#[tokio::test]
async fn test_three_row_two_column_success() {
    let c = console(FakeDb::answering(Step::Rows(three_users())), 10);

    match c.orchestrator.handle(request("SELECT id, name FROM users")).await {
        QueryOutcome::Success { columns, rows } => {
            assert_eq!(columns, vec!["id", "name"]);
            assert_eq!(rows.len(), 3);
            assert!(rows.iter().all(|r| r.len() == 2));
            assert_eq!(rows[2][1], Scalar::Null);
        }
        other => panic!("expected success, got {other:?}"),
    }

    let records = c.audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, AuditStatus::Success);
    assert_eq!(records[0].error_message, None);
}

#[tokio::test]
async fn test_rejected_statement_is_audited_as_error() {
    let c = console(FakeDb::answering(Step::Rows(three_users())), 10);

    let outcome = c.orchestrator.handle(request("DROP TABLE users")).await;
    assert_eq!(
        outcome,
        QueryOutcome::Failure {
            error_message: READ_ONLY_REASON.to_string()
        }
    );
    assert!(c.db.statements().is_empty());

    let records = c.audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, AuditStatus::Error);
    assert_eq!(records[0].statement_text, "DROP TABLE users");
    assert!(records[0].elapsed_seconds.is_some());
}

#[tokio::test]
async fn test_driver_failure_message_reaches_actor_and_audit() {
    let c = console(
        FakeDb::answering(Step::Fail("relation \"userz\" does not exist".into())),
        10,
    );

    let outcome = c.orchestrator.handle(request("SELECT * FROM userz")).await;
    assert_eq!(
        outcome.error_message().as_deref(),
        Some("relation \"userz\" does not exist")
    );
    assert_eq!(
        c.audit.records()[0].error_message.as_deref(),
        Some("relation \"userz\" does not exist")
    );
}

#[tokio::test(start_paused = true)]
async fn test_one_second_limit_against_five_second_call() {
    let c = console(
        FakeDb::answering(Step::Sleep(Duration::from_secs(5), three_users())),
        1,
    );

    let outcome = c.orchestrator.handle(request("SELECT pg_sleep(5)")).await;
    assert_eq!(outcome, QueryOutcome::Timeout { limit_seconds: 1 });

    let record = &c.audit.records()[0];
    assert_eq!(record.status, AuditStatus::Error);
    assert_eq!(
        record.error_message.as_deref(),
        Some("Timeout: query exceeded the time limit of 1 seconds")
    );
}

#[tokio::test(start_paused = true)]
async fn test_call_finishing_inside_limit_is_never_timeout() {
    let c = console(
        FakeDb::answering(Step::Sleep(Duration::from_millis(1500), three_users())),
        2,
    );
    assert!(c.orchestrator.handle(request("SELECT 1")).await.is_success());
}

#[tokio::test]
async fn test_every_request_produces_exactly_one_record() {
    let c = console(
        FakeDb::scripted(
            vec![
                Step::Rows(three_users()),
                Step::Fail("boom".into()),
                Step::Rows(row_set(&["x"], vec![])),
            ],
            Step::Rows(three_users()),
        ),
        10,
    );

    let statements = [
        "SELECT * FROM a",
        "SELECT * FROM b",
        "update t set x = 1",
        "SELECT * FROM c",
        "",
    ];
    let mut outcomes = Vec::new();
    for sql in statements {
        outcomes.push(c.orchestrator.handle(request(sql)).await);
    }

    let records = c.audit.records();
    assert_eq!(records.len(), statements.len());
    for (outcome, record) in outcomes.iter().zip(&records) {
        let expected = if outcome.is_success() {
            AuditStatus::Success
        } else {
            AuditStatus::Error
        };
        assert_eq!(record.status, expected);
    }
}

#[tokio::test]
async fn test_unknown_actor_is_a_valid_identity() {
    let c = console(FakeDb::answering(Step::Rows(three_users())), 10);
    let actor = c.orchestrator.session_actor(None);
    assert_eq!(actor.as_str(), UNKNOWN_ACTOR);

    assert!(c
        .orchestrator
        .handle(QueryRequest::new(actor, "SELECT 1"))
        .await
        .is_success());
    assert_eq!(c.audit.records()[0].actor, UNKNOWN_ACTOR);
}

#[tokio::test]
async fn test_client_details_are_recorded() {
    let c = console(FakeDb::answering(Step::Rows(three_users())), 10);
    let client = ClientInfo {
        address: Some("10.20.30.40".into()),
        agent: Some("Mozilla/5.0".into()),
    };

    c.orchestrator
        .handle(request("SELECT 1").with_client(client))
        .await;

    let record = &c.audit.records()[0];
    assert_eq!(record.client_address.as_deref(), Some("10.20.30.40"));
    assert_eq!(record.client_agent.as_deref(), Some("Mozilla/5.0"));
}

#[tokio::test]
async fn test_concurrent_requests_are_independent() {
    let c = console(FakeDb::answering(Step::Rows(three_users())), 10);

    let mut tasks = Vec::new();
    for i in 0..16 {
        let orchestrator = Arc::clone(&c.orchestrator);
        tasks.push(tokio::spawn(async move {
            let sql = if i % 2 == 0 { "SELECT 1" } else { "DELETE FROM t" };
            orchestrator
                .handle(QueryRequest::new(Actor::new(format!("user{i}")), sql))
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let records = c.audit.records();
    assert_eq!(records.len(), 16);
    let errors = records
        .iter()
        .filter(|r| r.status == AuditStatus::Error)
        .count();
    assert_eq!(errors, 8);
}

// === Audit failures never reach the caller ===

struct UnreachableStore;

#[async_trait]
impl AuditStore for UnreachableStore {
    async fn append(&self, _entry: &AuditEntry) -> ConsoleResult<()> {
        Err(ConsoleError::AuditWriteFailure {
            message: "could not connect to audit database".into(),
        })
    }

    async fn recent(&self, _limit: usize) -> ConsoleResult<Vec<AuditRecord>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_failing_audit_store_does_not_affect_outcome() {
    let c = console_with_store(
        FakeDb::answering(Step::Rows(three_users())),
        10,
        Arc::new(UnreachableStore),
        Arc::new(InMemoryAuditStore::default()),
    );

    let outcome = c.orchestrator.handle(request("SELECT id, name FROM users")).await;
    assert_eq!(outcome.row_count(), 3);

    let rejected = c.orchestrator.handle(request("TRUNCATE users")).await;
    assert!(!rejected.is_success());
}

struct HangingStore;

#[async_trait]
impl AuditStore for HangingStore {
    async fn append(&self, _entry: &AuditEntry) -> ConsoleResult<()> {
        std::future::pending().await
    }

    async fn recent(&self, _limit: usize) -> ConsoleResult<Vec<AuditRecord>> {
        Ok(Vec::new())
    }
}

#[tokio::test(start_paused = true)]
async fn test_hanging_audit_store_does_not_stall_response() {
    let c = console_with_store(
        FakeDb::answering(Step::Rows(three_users())),
        10,
        Arc::new(HangingStore),
        Arc::new(InMemoryAuditStore::default()),
    );

    let started = tokio::time::Instant::now();
    let outcome = tokio::time::timeout(
        Duration::from_secs(600),
        c.orchestrator.handle(request("SELECT id, name FROM users")),
    )
    .await
    .expect("response must not wait on the audit store");

    assert_eq!(outcome.row_count(), 3);
    assert!(started.elapsed() <= Duration::from_secs(5));

    let token = tokio::time::timeout(
        Duration::from_secs(600),
        c.orchestrator.login("ana", "s3cret", ClientInfo::default()),
    )
    .await
    .expect("login must not wait on the audit store");
    assert!(token.is_ok());
}

// === Callers that go away ===

#[tokio::test(start_paused = true)]
async fn test_dropped_request_is_still_executed_and_audited() {
    let c = console(
        FakeDb::answering(Step::Sleep(Duration::from_secs(5), three_users())),
        60,
    );

    let abandoned = tokio::time::timeout(
        Duration::from_secs(1),
        c.orchestrator.handle(request("SELECT id, name FROM users")),
    )
    .await;
    assert!(abandoned.is_err());
    assert!(c.audit.records().is_empty());

    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(c.db.statements(), vec!["SELECT id, name FROM users"]);
    let records = c.audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, AuditStatus::Success);
    assert_eq!(records[0].statement_text, "SELECT id, name FROM users");
}

#[tokio::test(start_paused = true)]
async fn test_dropped_timeout_request_is_still_audited() {
    let c = console(FakeDb::answering(Step::Hang), 2);

    let abandoned = tokio::time::timeout(
        Duration::from_secs(1),
        c.orchestrator.handle(request("SELECT pg_sleep(600)")),
    )
    .await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_secs(10)).await;

    let records = c.audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, AuditStatus::Error);
    assert!(records[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("2 seconds"));
}

// === Login path ===

#[tokio::test]
async fn test_login_success_and_failure_labels() {
    let c = console(FakeDb::answering(Step::Rows(three_users())), 10);

    let token = c
        .orchestrator
        .login("ana", "s3cret", ClientInfo::default())
        .await
        .unwrap();
    assert_eq!(c.orchestrator.session_actor(Some(&token)), Actor::new("ana"));

    let err = c
        .orchestrator
        .login("ana", "guess", ClientInfo::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ConsoleError::AuthFailure { .. }));

    let records = c.audit.records();
    assert_eq!(records[0].statement_text, LOGIN_LABEL);
    assert_eq!(records[0].status, AuditStatus::Success);
    assert_eq!(records[1].statement_text, LOGIN_ATTEMPT_LABEL);
    assert_eq!(records[1].status, AuditStatus::Error);
}

#[tokio::test]
async fn test_correct_password_wrong_group_is_auth_failure() {
    let db = FakeDb::answering(Step::Rows(row_set(
        &["password", "group_name"],
        vec![vec![
            Scalar::Text("s3cret".into()),
            Scalar::Text("reporting".into()),
        ]],
    )));
    let executor = Arc::new(TimedExecutor::new(db.clone(), 10));
    let audit = Arc::new(InMemoryAuditStore::default());
    let orchestrator = QueryOrchestrator::new(
        Arc::clone(&executor),
        AuditRecorder::new(audit.clone()),
        Arc::new(InMemorySessionStore::default()),
        Arc::new(DirectoryVerifier::new(
            executor,
            "SELECT password, group_name FROM console_users WHERE UPPER(username) = $1",
            "plsql",
        )),
    );

    let err = orchestrator
        .login("ana", "s3cret", ClientInfo::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ConsoleError::AuthFailure { .. }));
    assert_eq!(orchestrator.sessions().session_count(), 0);

    let records = audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, AuditStatus::Error);
    assert_eq!(records[0].statement_text, LOGIN_ATTEMPT_LABEL);

    let (_, params) = &db.seen.lock()[0];
    assert_eq!(params.get("username"), Some(&Scalar::Text("ANA".into())));
}

#[tokio::test]
async fn test_logout_ends_session() {
    let c = console(FakeDb::answering(Step::Rows(three_users())), 10);
    let token = c
        .orchestrator
        .login("ana", "s3cret", ClientInfo::default())
        .await
        .unwrap();

    assert!(c.orchestrator.logout(&token));
    assert!(c.orchestrator.session_actor(Some(&token)).is_unknown());
    assert!(!c.orchestrator.logout(&token));
}

//! Authentication
//!
//! Credential checks against the user directory held in the database, plus
//! password hashing (argon2id) for directories that store PHC strings.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::execution::TimedExecutor;
use crate::value::Params;

/// Decides whether a username/password pair may open a session.
#[async_trait]
pub trait CredentialVerifier: Send + Sync + 'static {
    /// `true` only for valid credentials. Lookup faults count as `false`.
    async fn verify(&self, username: &str, password: &str) -> bool;
}

/// Verifies credentials with a parameterised directory lookup.
///
/// The lookup must return `password, group_name` for the username bound as
/// `$1` (upper-cased before binding). The stored password may be plaintext,
/// compared after trimming both sides, or an argon2 PHC string.
pub struct DirectoryVerifier {
    executor: Arc<TimedExecutor>,
    lookup_sql: String,
    required_group: String,
}

impl DirectoryVerifier {
    pub fn new(
        executor: Arc<TimedExecutor>,
        lookup_sql: impl Into<String>,
        required_group: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            lookup_sql: lookup_sql.into(),
            required_group: required_group.into(),
        }
    }
}

#[async_trait]
impl CredentialVerifier for DirectoryVerifier {
    async fn verify(&self, username: &str, password: &str) -> bool {
        let params = Params::new().with("username", username.to_uppercase());
        let rows = match self.executor.fetch(&self.lookup_sql, params).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(username, error = %e, "credential_lookup_failed");
                return false;
            }
        };

        let Some(row) = rows.rows.first() else {
            debug!(username, "credential_unknown_user");
            return false;
        };
        let stored = row.first().and_then(|v| v.as_str()).unwrap_or_default();
        let group = row.get(1).and_then(|v| v.as_str()).unwrap_or_default();

        if !password_matches(stored, password) {
            debug!(username, "credential_password_mismatch");
            return false;
        }
        if group != self.required_group {
            debug!(username, group, required = %self.required_group, "credential_group_mismatch");
            return false;
        }
        true
    }
}

fn password_matches(stored: &str, supplied: &str) -> bool {
    let stored = stored.trim();
    if stored.is_empty() {
        return false;
    }
    if stored.starts_with("$argon2") {
        return verify_password(supplied, stored);
    }
    stored == supplied.trim()
}

// ── Password Hashing (argon2id) ─────────────────────────────────────────────

/// Hash a password using argon2id with a random salt.
pub fn hash_password(password: &str) -> Result<String, String> {
    use argon2::{
        password_hash::{rand_core::OsRng, SaltString},
        Argon2, PasswordHasher,
    };
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| format!("argon2 hashing failed: {e}"))
}

/// Verify a password against an argon2id hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::{password_hash::PasswordHash, Argon2, PasswordVerifier};
    let parsed = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::testing::{rows, Script, ScriptedConnector};
    use crate::value::Scalar;
    use std::time::Duration;

    const LOOKUP: &str = "SELECT password, group_name FROM console_users WHERE UPPER(username) = $1";

    fn directory(script: Script) -> (DirectoryVerifier, Arc<crate::database::testing::Journal>) {
        let connector = ScriptedConnector::always(script);
        let journal = Arc::clone(&connector.journal);
        let executor = Arc::new(TimedExecutor::new(connector, 5));
        (DirectoryVerifier::new(executor, LOOKUP, "plsql"), journal)
    }

    fn user_row(password: &str, group: &str) -> Script {
        Script::Rows(rows(
            &["password", "group_name"],
            vec![vec![Scalar::Text(password.into()), Scalar::Text(group.into())]],
        ))
    }

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("s3cret").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("s3cret", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn test_hash_password_unique_salts() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_password_invalid_hash() {
        assert!(!verify_password("x", "not-a-phc-string"));
    }

    #[tokio::test]
    async fn test_valid_plaintext_credentials() {
        let (verifier, journal) = directory(user_row("  s3cret ", "plsql"));
        assert!(verifier.verify("ana", "s3cret").await);

        let seen = journal.statements.lock();
        assert_eq!(seen[0].0, LOOKUP);
        assert_eq!(seen[0].1.get("username"), Some(&Scalar::Text("ANA".into())));
    }

    #[tokio::test]
    async fn test_argon2_stored_password() {
        let hash = hash_password("s3cret").unwrap();
        let (verifier, _) = directory(user_row(&hash, "plsql"));
        assert!(verifier.verify("ana", "s3cret").await);
        assert!(!verifier.verify("ana", "nope").await);
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let (verifier, _) = directory(user_row("s3cret", "plsql"));
        assert!(!verifier.verify("ana", "guess").await);
    }

    #[tokio::test]
    async fn test_wrong_group() {
        let (verifier, _) = directory(user_row("s3cret", "reporting"));
        assert!(!verifier.verify("ana", "s3cret").await);
    }

    #[tokio::test]
    async fn test_empty_stored_password_never_matches() {
        let (verifier, _) = directory(user_row("", "plsql"));
        assert!(!verifier.verify("ana", "").await);
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let (verifier, _) = directory(Script::Rows(rows(&["password", "group_name"], vec![])));
        assert!(!verifier.verify("ghost", "x").await);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_rejection() {
        let (verifier, _) = directory(Script::Fail("permission denied".into()));
        assert!(!verifier.verify("ana", "s3cret").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_timeout_is_rejection() {
        let (verifier, _) = directory(Script::Delay(
            Duration::from_secs(30),
            rows(&["password", "group_name"], vec![]),
        ));
        assert!(!verifier.verify("ana", "s3cret").await);
    }
}

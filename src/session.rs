//! Session Store
//!
//! Maps opaque session tokens to the actor who logged in. Sessions live in
//! process memory only: a restart logs everyone out.
//!
//! ## Architecture
//!
//! ```text
//! SessionStore (trait: issue / lookup / revoke / reap_expired)
//! └── InMemorySessionStore
//!     ├── RwLock<HashMap<token, Entry>>
//!     └── optional idle timeout (reaped by a background task)
//!
//! CookieSigner
//! └── cookie value = "<token>.<sha256(secret:token)>"
//! ```

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

/// Opaque session token.
pub type SessionToken = String;

/// What a token resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub actor: String,
    pub issued_at: DateTime<Utc>,
}

/// Session lookup contract shared by the orchestrator and the HTTP layer.
pub trait SessionStore: Send + Sync + 'static {
    /// Create a session for `actor` and return its token.
    fn issue(&self, actor: &str) -> SessionToken;

    /// Resolve a token; unknown or expired tokens give `None`.
    fn lookup(&self, token: &str) -> Option<SessionInfo>;

    /// Remove a session. Returns whether it existed.
    fn revoke(&self, token: &str) -> bool;

    /// Drop expired sessions, returning how many were removed.
    fn reap_expired(&self) -> usize {
        0
    }

    fn session_count(&self) -> usize;
}

/// Generate a random token (32 bytes → 64 hex characters).
pub fn generate_token() -> SessionToken {
    use rand::Rng;
    use std::fmt::Write;
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    let mut hex = String::with_capacity(64);
    for b in &bytes {
        let _ = write!(hex, "{b:02x}");
    }
    hex
}

struct Entry {
    info: SessionInfo,
    last_accessed: Instant,
}

/// Concurrency-safe in-memory session table.
///
/// Last write wins on token issuance; there is no transactional behaviour.
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionToken, Entry>>,
    idle_timeout: Option<Duration>,
}

impl InMemorySessionStore {
    /// `idle_timeout_secs == 0` keeps sessions for the life of the process.
    pub fn new(idle_timeout_secs: u64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout: (idle_timeout_secs > 0).then(|| Duration::from_secs(idle_timeout_secs)),
        }
    }

    fn expired(&self, entry: &Entry, now: Instant) -> bool {
        self.idle_timeout
            .is_some_and(|timeout| now.duration_since(entry.last_accessed) >= timeout)
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SessionStore for InMemorySessionStore {
    fn issue(&self, actor: &str) -> SessionToken {
        let token = generate_token();
        let entry = Entry {
            info: SessionInfo {
                actor: actor.to_string(),
                issued_at: Utc::now(),
            },
            last_accessed: Instant::now(),
        };
        self.sessions.write().insert(token.clone(), entry);
        tracing::info!(actor, "session_issued");
        token
    }

    fn lookup(&self, token: &str) -> Option<SessionInfo> {
        let now = Instant::now();
        let mut sessions = self.sessions.write();
        let entry = sessions.get_mut(token)?;
        if self.expired(entry, now) {
            sessions.remove(token);
            return None;
        }
        entry.last_accessed = now;
        Some(entry.info.clone())
    }

    fn revoke(&self, token: &str) -> bool {
        let removed = self.sessions.write().remove(token);
        if let Some(entry) = &removed {
            tracing::info!(actor = %entry.info.actor, "session_revoked");
        }
        removed.is_some()
    }

    fn reap_expired(&self) -> usize {
        if self.idle_timeout.is_none() {
            return 0;
        }
        let now = Instant::now();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, entry| !self.expired(entry, now));
        before - sessions.len()
    }

    fn session_count(&self) -> usize {
        self.sessions.read().len()
    }
}

/// Signs session tokens with the configured shared secret.
#[derive(Clone)]
pub struct CookieSigner {
    secret: String,
}

impl CookieSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn signature(&self, token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b":");
        hasher.update(token.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Cookie value for a token.
    pub fn sign(&self, token: &str) -> String {
        format!("{token}.{}", self.signature(token))
    }

    /// Extract the token from a cookie value if its signature matches.
    pub fn verify<'a>(&self, cookie_value: &'a str) -> Option<&'a str> {
        let (token, signature) = cookie_value.rsplit_once('.')?;
        let expected = self.signature(token);
        constant_time_eq(expected.as_bytes(), signature.as_bytes()).then_some(token)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

//! Read-only Policy Gate
//!
//! Decides whether a submitted statement may reach the executor. The check is
//! a syntactic prefix test: the first token (after leading whitespace, compared
//! case-insensitively) must be the keyword `SELECT`.
//!
//! ## Residual risk
//!
//! This is not a parser. It does not look past the first token, so:
//! - `SELECT 1; DELETE FROM t` is admitted (statement separators are not detected),
//! - `WITH x AS (...) SELECT ...` is rejected (CTEs do not start with `SELECT`),
//! - `/* c */ SELECT 1` and `-- c\nSELECT 1` are rejected (comments are not skipped).
//!
//! Run the console against a database role that only holds read privileges;
//! the gate is a guard rail, not the security boundary.

use crate::error::ConsoleError;

/// Fixed reason returned for every rejected statement.
pub const READ_ONLY_REASON: &str = "only SELECT statements are permitted";

const ALLOWED_KEYWORD: &str = "SELECT";

/// Gate decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Rejected { reason: String },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }

    pub fn into_result(self) -> Result<(), ConsoleError> {
        match self {
            Admission::Allowed => Ok(()),
            Admission::Rejected { reason } => Err(ConsoleError::PolicyViolation { reason }),
        }
    }
}

/// First token of the statement: the leading run of identifier characters.
fn leading_token(statement: &str) -> &str {
    let trimmed = statement.trim_start();
    let end = trimmed
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(trimmed.len());
    &trimmed[..end]
}

/// Decide whether `statement` may run.
///
/// The statement itself is never modified; the token is only inspected.
pub fn admit(statement: &str) -> Admission {
    if leading_token(statement).eq_ignore_ascii_case(ALLOWED_KEYWORD) {
        Admission::Allowed
    } else {
        Admission::Rejected {
            reason: READ_ONLY_REASON.to_string(),
        }
    }
}

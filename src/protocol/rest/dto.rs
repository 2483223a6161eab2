//! REST API Data Transfer Objects
//!
//! Defines request/response types for the REST API endpoints.

use serde::{Deserialize, Serialize};

use crate::audit::AuditRecord;
use crate::catalog::ColumnInfo;
use crate::orchestrator::QueryReport;

use super::error::ApiError;

/// JSON response: { success, data?, error? }
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError::new(code, message)),
        }
    }
}

// Admin DTOs
#[derive(Debug, Serialize)]
pub struct HealthDto {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

// Session DTOs
/// Login form; the legacy field names are accepted too.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "usuario")]
    pub username: String,
    #[serde(alias = "senha")]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginDto {
    pub actor: String,
}

#[derive(Debug, Serialize)]
pub struct LogoutDto {
    pub revoked: bool,
}

// Query DTOs
#[derive(Debug, Deserialize)]
pub struct ExecuteQueryRequest {
    #[serde(alias = "sql_query")]
    pub sql: String,
}

/// Query result: `success` mirrors the outcome, `error` carries the message
/// for failures and timeouts.
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub report: QueryReport,
}

impl From<QueryReport> for QueryResponse {
    fn from(report: QueryReport) -> Self {
        Self {
            success: report.outcome.is_success(),
            error: report.outcome.error_message(),
            report,
        }
    }
}

// Audit log DTOs
#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct AuditLogDto {
    pub limit: usize,
    pub records: Vec<AuditRecord>,
}

// Autocomplete DTOs
#[derive(Debug, Deserialize)]
pub struct AutocompleteQuery {
    pub alias: String,
    pub sql: String,
}

#[derive(Debug, Serialize)]
pub struct ColumnsDto {
    pub alias: String,
    pub schema: Option<String>,
    pub table: String,
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Deserialize)]
pub struct TablesQuery {
    pub prefix: String,
}

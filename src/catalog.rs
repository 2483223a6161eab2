//! Catalog lookups for editor autocomplete
//!
//! Column and table discovery through `information_schema`. Every value that
//! reaches the database (table, schema, prefix, limit) is a bound parameter;
//! the user's SQL text is only scanned locally to resolve an alias.

use std::sync::Arc;

use regex::RegexBuilder;
use serde::Serialize;

use crate::error::{ConsoleError, ConsoleResult};
use crate::execution::TimedExecutor;
use crate::value::{Params, Scalar};

/// Words that can precede an alias-looking token without being a table name.
const NON_TABLE_WORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "OUTER", "CROSS", "ON",
    "AND", "OR", "NOT", "BY", "AS", "IN", "IS", "CASE", "WHEN", "THEN", "ELSE", "END", "DISTINCT",
    "HAVING", "UNION", "ALL", "WITH", "LIKE", "BETWEEN",
];

const COLUMNS_SQL: &str = "SELECT column_name::text, data_type::text, \
            character_maximum_length::bigint, numeric_precision::bigint, numeric_scale::bigint \
     FROM information_schema.columns \
     WHERE UPPER(table_name) = UPPER($1) \
       AND UPPER(table_schema) = UPPER(COALESCE($2::text, current_schema())) \
     ORDER BY ordinal_position";

const TABLES_SQL: &str = "SELECT table_name::text \
     FROM information_schema.tables \
     WHERE UPPER(table_schema) = UPPER(COALESCE($1::text, current_schema())) \
       AND UPPER(table_name) LIKE (UPPER($2::text) || '%') ESCAPE '\\' \
     ORDER BY table_name \
     LIMIT $3";

/// A possibly schema-qualified table name. `schema == None` means the
/// connection's current schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRef {
    pub schema: Option<String>,
    pub table: String,
}

impl TableRef {
    /// Split `schema.table` (or plain `table`), upper-casing both parts.
    pub fn parse(qualified: &str) -> Self {
        let upper = qualified.to_uppercase();
        match upper.split_once('.') {
            Some((schema, table)) => TableRef {
                schema: Some(schema.to_string()),
                table: table.to_string(),
            },
            None => TableRef {
                schema: None,
                table: upper,
            },
        }
    }
}

/// One column as shown in the editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

/// Tables matching a prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableMatches {
    pub schema: Option<String>,
    pub prefix: String,
    pub tables: Vec<String>,
}

/// Find the table that `alias` stands for in `sql`.
///
/// Looks for `<table> <alias>` or `<table> AS <alias>`, case-insensitive and
/// word-bounded. Occurrences of the alias used as a qualifier (`a.col`) and
/// keywords in the table position are skipped.
pub fn resolve_alias(sql: &str, alias: &str) -> Option<TableRef> {
    let alias = alias.trim();
    if alias.is_empty() {
        return None;
    }
    let pattern = format!(r"([\w.]+)\s+(?:AS\s+)?{}\b", regex::escape(alias));
    let re = RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .ok()?;

    // Bound first: the match iterator borrows `re` and must drop before it.
    let found = re.captures_iter(sql).find_map(|caps| {
        let whole = caps.get(0)?;
        let candidate = caps.get(1)?.as_str();
        if sql[whole.end()..].starts_with('.') {
            return None;
        }
        if NON_TABLE_WORDS
            .iter()
            .any(|kw| kw.eq_ignore_ascii_case(candidate))
        {
            return None;
        }
        Some(TableRef::parse(candidate))
    });
    found
}

/// Render a column type the way the editor shows it: `character varying(30)`,
/// `numeric(10,2)`, or the bare type name.
pub fn format_column_type(
    data_type: &str,
    char_length: Option<i64>,
    precision: Option<i64>,
    scale: Option<i64>,
) -> String {
    if let Some(len) = char_length {
        return format!("{data_type}({len})");
    }
    if data_type.eq_ignore_ascii_case("numeric") {
        match (precision, scale) {
            (Some(p), Some(s)) => return format!("{data_type}({p},{s})"),
            (Some(p), None) => return format!("{data_type}({p})"),
            _ => {}
        }
    }
    data_type.to_string()
}

/// Escape LIKE wildcards so a prefix matches literally.
pub fn escape_like(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Autocomplete lookups, run through the timed executor.
pub struct Catalog {
    executor: Arc<TimedExecutor>,
    table_limit: usize,
}

impl Catalog {
    pub fn new(executor: Arc<TimedExecutor>, table_limit: usize) -> Self {
        Self {
            executor,
            table_limit,
        }
    }

    pub fn table_limit(&self) -> usize {
        self.table_limit
    }

    /// Columns of `table` in ordinal order.
    pub async fn columns_for(&self, table: &TableRef) -> ConsoleResult<Vec<ColumnInfo>> {
        let params = Params::new()
            .with("table", table.table.as_str())
            .with("schema", table.schema.clone());
        let result = self.executor.fetch(COLUMNS_SQL, params).await?;

        result
            .rows
            .into_iter()
            .map(|row| {
                let mut cells = row.into_iter();
                let name = cells.next().and_then(Scalar::into_text).ok_or_else(|| {
                    ConsoleError::ExecutionFailure {
                        message: "column lookup returned no name".into(),
                    }
                })?;
                let data_type = cells.next().and_then(Scalar::into_text).unwrap_or_default();
                let char_length = cells.next().and_then(|v| v.as_i64());
                let precision = cells.next().and_then(|v| v.as_i64());
                let scale = cells.next().and_then(|v| v.as_i64());
                Ok(ColumnInfo {
                    name,
                    data_type: format_column_type(&data_type, char_length, precision, scale),
                })
            })
            .collect()
    }

    /// Tables whose name starts with `prefix`; `schema.prefix` narrows the schema.
    pub async fn tables_with_prefix(&self, prefix: &str) -> ConsoleResult<TableMatches> {
        let TableRef { schema, table } = TableRef::parse(prefix.trim());
        let params = Params::new()
            .with("schema", schema.clone())
            .with("prefix", escape_like(&table))
            .with("limit", self.table_limit);
        let result = self.executor.fetch(TABLES_SQL, params).await?;

        let tables = result
            .rows
            .into_iter()
            .filter_map(|row| row.into_iter().next().and_then(Scalar::into_text))
            .collect();
        Ok(TableMatches {
            schema,
            prefix: table,
            tables,
        })
    }
}

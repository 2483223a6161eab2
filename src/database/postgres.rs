//! PostgreSQL connector backed by `sqlx::PgConnection`.
//!
//! Each `connect()` opens a dedicated connection; nothing is pooled.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgRow, PgValueFormat};
use sqlx::query::Query;
use sqlx::{
    Column, Connection as _, Executor, PgConnection, Postgres, Row, Statement, TypeInfo, ValueRef,
};
use tracing::debug;

use super::{mask_database_url, Connection, Connector, DbError, RowSet};
use crate::value::{Params, Scalar};

/// Opens one `PgConnection` per call.
pub struct PgConnector {
    url: String,
    connect_timeout: Duration,
}

impl PgConnector {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl Connector for PgConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, DbError> {
        let conn = tokio::time::timeout(self.connect_timeout, PgConnection::connect(&self.url))
            .await
            .map_err(|_| {
                DbError::Connect(format!(
                    "no answer from {} within {}s",
                    mask_database_url(&self.url),
                    self.connect_timeout.as_secs()
                ))
            })?
            .map_err(|e| DbError::Connect(e.to_string()))?;
        debug!(url = %mask_database_url(&self.url), "db_connection_opened");
        Ok(Box::new(PgSession { conn: Some(conn) }))
    }
}

struct PgSession {
    conn: Option<PgConnection>,
}

impl PgSession {
    fn conn(&mut self) -> Result<&mut PgConnection, DbError> {
        self.conn
            .as_mut()
            .ok_or_else(|| DbError::Connect("connection already closed".to_string()))
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &Params,
) -> Query<'q, Postgres, PgArguments> {
    for value in params.values() {
        query = match value.clone() {
            Scalar::Null => query.bind(Option::<String>::None),
            Scalar::Bool(b) => query.bind(b),
            Scalar::Int(i) => query.bind(i),
            Scalar::Float(f) => query.bind(f),
            Scalar::Text(s) => query.bind(s),
            Scalar::Timestamp(t) => query.bind(t),
        };
    }
    query
}

fn decode_err(column: &str, e: &sqlx::Error) -> DbError {
    DbError::Decode {
        column: column.to_string(),
        message: e.to_string(),
    }
}

/// Convert one cell by its PostgreSQL type name.
///
/// SQL NULL is checked on the raw value before any typed decode. Types with
/// no native mapping, and NUMERIC values too wide for `Decimal`, come back as
/// text rather than NULL.
fn decode_cell(row: &PgRow, index: usize) -> Result<Scalar, DbError> {
    let column = &row.columns()[index];
    let name = column.name();
    let type_name = column.type_info().name();

    let raw = row.try_get_raw(index).map_err(|e| decode_err(name, &e))?;
    if raw.is_null() {
        return Ok(Scalar::Null);
    }

    macro_rules! get {
        ($ty:ty) => {
            row.try_get::<$ty, _>(index)
                .map_err(|e| decode_err(name, &e))?
        };
    }

    let value = match type_name {
        "BOOL" => Scalar::Bool(get!(bool)),
        "INT2" => Scalar::Int(i64::from(get!(i16))),
        "INT4" => Scalar::Int(i64::from(get!(i32))),
        "INT8" => Scalar::Int(get!(i64)),
        "FLOAT4" => Scalar::Float(f64::from(get!(f32))),
        "FLOAT8" => Scalar::Float(get!(f64)),
        "NUMERIC" => match row.try_get::<rust_decimal::Decimal, _>(index) {
            Ok(d) => Scalar::Text(d.to_string()),
            Err(e) => {
                debug!(column = name, error = %e, "numeric_outside_decimal_range");
                fallback_text(type_name, raw.format(), raw.as_bytes().unwrap_or_default())
            }
        },
        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => Scalar::Text(get!(String)),
        "UUID" => Scalar::Text(get!(uuid::Uuid).to_string()),
        "JSON" | "JSONB" => Scalar::Text(get!(serde_json::Value).to_string()),
        "TIMESTAMPTZ" => Scalar::Timestamp(get!(chrono::DateTime<chrono::Utc>)),
        "TIMESTAMP" => Scalar::Timestamp(get!(chrono::NaiveDateTime).and_utc()),
        "DATE" => Scalar::Text(get!(chrono::NaiveDate).to_string()),
        "TIME" => Scalar::Text(get!(chrono::NaiveTime).to_string()),
        other => {
            debug!(column = name, type_name = other, "unsupported_column_type");
            fallback_text(other, raw.format(), raw.as_bytes().unwrap_or_default())
        }
    };
    Ok(value)
}

/// Text rendering of a non-NULL value with no native mapping.
///
/// Text-format values are used as sent. Binary NUMERIC is expanded digit by
/// digit. Other binary payloads are kept when they are printable UTF-8 (enums,
/// domains over text); anything else becomes `<TYPE>`.
fn fallback_text(type_name: &str, format: PgValueFormat, bytes: &[u8]) -> Scalar {
    let text = match format {
        PgValueFormat::Text => std::str::from_utf8(bytes).ok().map(str::to_string),
        PgValueFormat::Binary if type_name == "NUMERIC" => numeric_text(bytes),
        PgValueFormat::Binary => std::str::from_utf8(bytes)
            .ok()
            .filter(|s| !s.chars().any(char::is_control))
            .map(str::to_string),
    };
    Scalar::Text(text.unwrap_or_else(|| format!("<{type_name}>")))
}

/// Decimal string of a binary NUMERIC: header of ndigits, weight, sign and
/// dscale, then base-10000 digits.
fn numeric_text(bytes: &[u8]) -> Option<String> {
    let word = |at: usize| bytes.get(at..at + 2).map(|b| u16::from_be_bytes([b[0], b[1]]));

    let ndigits = usize::from(word(0)?);
    let weight = i32::from(word(2)? as i16);
    let sign = word(4)?;
    let dscale = usize::from(word(6)?);
    match sign {
        0xC000 => return Some("NaN".to_string()),
        0xD000 => return Some("Infinity".to_string()),
        0xF000 => return Some("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits)
        .map(|i| word(8 + 2 * i))
        .collect::<Option<Vec<u16>>>()?;
    let digit = |pos: i32| {
        usize::try_from(pos)
            .ok()
            .and_then(|p| digits.get(p).copied())
            .unwrap_or(0)
    };

    let mut text = String::new();
    if sign == 0x4000 {
        text.push('-');
    }
    if weight < 0 {
        text.push('0');
    } else {
        text.push_str(&digit(0).to_string());
        for pos in 1..=weight {
            text.push_str(&format!("{:04}", digit(pos)));
        }
    }
    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut pos = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit(pos)));
            pos += 1;
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }
    Some(text)
}

#[async_trait]
impl Connection for PgSession {
    async fn fetch(&mut self, sql: &str, params: &Params) -> Result<RowSet, DbError> {
        let conn = self.conn()?;

        // Prepare first so column names are known even for empty results.
        let statement = (&mut *conn)
            .prepare(sql)
            .await
            .map_err(|e| DbError::Statement(e.to_string()))?;
        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let pg_rows = bind_params(statement.query(), params)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| DbError::Statement(e.to_string()))?;

        let mut rows = Vec::with_capacity(pg_rows.len());
        for pg_row in &pg_rows {
            let cells = (0..pg_row.len())
                .map(|i| decode_cell(pg_row, i))
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(cells);
        }

        Ok(RowSet { columns, rows })
    }

    async fn execute(&mut self, sql: &str, params: &Params) -> Result<u64, DbError> {
        let conn = self.conn()?;
        let mut tx = conn
            .begin()
            .await
            .map_err(|e| DbError::Statement(e.to_string()))?;
        let result = bind_params(sqlx::query(sql), params)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::Statement(e.to_string()))?;
        tx.commit()
            .await
            .map_err(|e| DbError::Commit(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn close(&mut self) -> Result<(), DbError> {
        match self.conn.take() {
            Some(conn) => conn
                .close()
                .await
                .map_err(|e| DbError::Connect(e.to_string())),
            None => Ok(()),
        }
    }
}

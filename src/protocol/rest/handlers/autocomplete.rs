//! Autocomplete Handlers
//!
//! Lookup failures are answered with `success: false` and status 200 so the
//! editor can keep going.

use std::sync::Arc;

use axum::{extract::Query, Extension, Json};

use crate::catalog::{resolve_alias, TableMatches};
use crate::protocol::rest::dto::{ApiResponse, AutocompleteQuery, ColumnsDto, TablesQuery};
use crate::protocol::rest::AppState;

/// Columns of the table behind `alias` in `sql`
pub async fn columns(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<AutocompleteQuery>,
) -> Json<ApiResponse<ColumnsDto>> {
    let Some(table) = resolve_alias(&query.sql, &query.alias) else {
        return Json(ApiResponse::failure(
            "ALIAS_NOT_FOUND",
            format!("Alias '{}' not found in the SQL text", query.alias),
        ));
    };

    match state.catalog.columns_for(&table).await {
        Ok(columns) => Json(ApiResponse::success(ColumnsDto {
            alias: query.alias,
            schema: table.schema,
            table: table.table,
            columns,
        })),
        Err(e) => Json(ApiResponse::failure("CATALOG_ERROR", e.to_string())),
    }
}

/// Tables whose name starts with `prefix` (`schema.prefix` accepted)
pub async fn tables(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<TablesQuery>,
) -> Json<ApiResponse<TableMatches>> {
    match state.catalog.tables_with_prefix(&query.prefix).await {
        Ok(matches) => Json(ApiResponse::success(matches)),
        Err(e) => Json(ApiResponse::failure("CATALOG_ERROR", e.to_string())),
    }
}

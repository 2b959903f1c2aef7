//! Admin CRUD over the schema tables.
//!
//! Rows are addressed by their 0-based position among data rows, exposed as
//! `_row` on reads and taken back through the `row` query parameter.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{Value, json};

use ecospray_core::upsert_site_config;
use ecospray_shared::{Record, SiteError};
use ecospray_storage::Table;

use super::json_body;
use crate::AppState;
use crate::error::ApiError;

const ROW_FIELD: &str = "_row";

#[derive(Debug, Deserialize)]
pub struct RowQuery {
    row: Option<String>,
}

impl RowQuery {
    fn index(&self) -> Result<usize, SiteError> {
        let raw = self
            .row
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| SiteError::validation("row query parameter is required"))?;
        raw.parse().map_err(|_| {
            SiteError::validation(format!(
                "row query parameter must be a non-negative integer (got '{raw}')"
            ))
        })
    }
}

pub async fn list_rows(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let table: Table = table.parse()?;
    let rows = state.store.read_rows(table).await?;

    let records = rows
        .iter()
        .enumerate()
        .map(|(index, row)| {
            let mut record = table.to_record(row);
            record.insert(ROW_FIELD.into(), json!(index));
            Value::Object(record)
        })
        .collect();
    Ok(Json(records))
}

/// Append one row; on `site_config`, upsert the posted `key`.
pub async fn create_row(
    State(state): State<AppState>,
    Path(table): Path<String>,
    body: Result<Json<Record>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let table: Table = table.parse()?;
    let mut record = json_body(body)?;
    record.remove(ROW_FIELD);

    if table == Table::SiteConfig {
        let key = record
            .get("key")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| SiteError::validation("key is required"))?
            .to_string();
        let value = record.get("value").cloned().unwrap_or(Value::Null);
        upsert_site_config(state.store.as_ref(), &key, &value).await?;
        return Ok(Json(json!({ "success": true, "key": key })));
    }

    state.store.append_rows(table, &[table.to_row(&record)]).await?;
    Ok(Json(json!({ "success": true })))
}

/// Replace the row at `?row=`.
pub async fn update_row(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(query): Query<RowQuery>,
    body: Result<Json<Record>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let table: Table = table.parse()?;
    let index = query.index()?;
    let mut record = json_body(body)?;
    record.remove(ROW_FIELD);

    state
        .store
        .update_row(table, index, &table.to_row(&record))
        .await?;
    Ok(Json(json!({ "success": true, "row": index })))
}

/// Delete the row at `?row=`.
pub async fn delete_row(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(query): Query<RowQuery>,
) -> Result<Json<Value>, ApiError> {
    let table: Table = table.parse()?;
    let index = query.index()?;

    state.store.delete_row(table, index).await?;
    Ok(Json(json!({ "success": true, "row": index })))
}

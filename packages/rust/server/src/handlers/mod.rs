//! Route handlers.

mod generate;
mod import;
mod leads;
mod tables;

pub use generate::generate;
pub use import::import;
pub use leads::{contact, guide_download, quote};
pub use tables::{create_row, delete_row, list_rows, update_row};

use axum::Json;
use axum::extract::rejection::JsonRejection;
use serde_json::{Value, json};

use ecospray_shared::SiteError;

use crate::error::ApiError;

/// Liveness probe.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Unwrap a JSON body, turning axum's rejection into our envelope.
pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| SiteError::validation(rejection.body_text()).into())
}

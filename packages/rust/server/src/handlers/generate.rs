use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde::Deserialize;
use serde_json::{Value, json};

use ecospray_core::{CopyKind, draft_copy};

use super::json_body;
use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    kind: Option<CopyKind>,
    #[serde(default)]
    gemini_key: Option<String>,
}

/// Draft marketing copy for the admin editor.
pub async fn generate(
    State(state): State<AppState>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request = json_body(body)?;
    let kind = request.kind.unwrap_or(CopyKind::Page);

    let text = draft_copy(
        state.import.gemini(),
        state.import.site_name(),
        &request.prompt,
        kind,
        request.gemini_key.as_deref(),
    )
    .await?;

    Ok(Json(json!({ "text": text, "kind": kind })))
}

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde_json::{Value, json};

use ecospray_core::{FormKind, LeadForm, THANK_YOU, record_lead};

use super::json_body;
use crate::AppState;
use crate::error::ApiError;

async fn submit(
    state: &AppState,
    kind: FormKind,
    body: Result<Json<LeadForm>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let lead = json_body(body)?.validate(kind)?;

    // Store and CRM failures are logged inside; the visitor is thanked regardless.
    record_lead(
        state.store.as_ref(),
        state.crm.as_deref(),
        &state.source_tag,
        kind,
        &lead,
    )
    .await;

    Ok(Json(json!({ "success": true, "message": THANK_YOU })))
}

pub async fn contact(
    State(state): State<AppState>,
    body: Result<Json<LeadForm>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    submit(&state, FormKind::Contact, body).await
}

pub async fn quote(
    State(state): State<AppState>,
    body: Result<Json<LeadForm>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    submit(&state, FormKind::Quote, body).await
}

pub async fn guide_download(
    State(state): State<AppState>,
    body: Result<Json<LeadForm>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    submit(&state, FormKind::GuideDownload, body).await
}

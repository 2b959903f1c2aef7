//! HTTP error envelope.

use std::collections::BTreeMap;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{error, warn};

use ecospray_core::WriteOutcome;
use ecospray_shared::SiteError;

/// Error returned by every handler, rendered as `{error, kind}`.
#[derive(Debug)]
pub enum ApiError {
    Site(SiteError),
    Unauthorized,
    /// Some categories of a `write` stage failed; the rest were written.
    PartialWrite {
        message: String,
        counts: BTreeMap<String, usize>,
    },
}

impl From<SiteError> for ApiError {
    fn from(err: SiteError) -> Self {
        Self::Site(err)
    }
}

impl From<WriteOutcome> for ApiError {
    fn from(outcome: WriteOutcome) -> Self {
        Self::PartialWrite {
            message: outcome.report.failure_message(),
            counts: outcome.report.counts,
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::PartialWrite { .. } => StatusCode::BAD_GATEWAY,
            Self::Site(err) => match err {
                SiteError::Validation { .. } => StatusCode::BAD_REQUEST,
                SiteError::Upstream { status, .. } => status
                    .and_then(|s| StatusCode::from_u16(s).ok())
                    .filter(|s| s.is_client_error() || s.is_server_error())
                    .unwrap_or(StatusCode::BAD_GATEWAY),
                SiteError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                SiteError::MalformedAiResponse { .. } | SiteError::Network(_) => {
                    StatusCode::BAD_GATEWAY
                }
                SiteError::Parse { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                SiteError::Config { .. } | SiteError::Storage(_) | SiteError::Io { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::PartialWrite { .. } => "partial_write",
            Self::Site(err) => err.kind(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();

        if status.is_server_error() {
            error!(kind, error = ?self, "request failed");
        } else if status != StatusCode::UNAUTHORIZED {
            warn!(kind, status = status.as_u16(), "request rejected");
        }

        let body = match self {
            Self::Unauthorized => json!({ "error": "Unauthorized", "kind": kind }),
            Self::PartialWrite { message, counts } => {
                json!({ "error": message, "kind": kind, "counts": counts })
            }
            Self::Site(err) => json!({ "error": err.to_string(), "kind": kind }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        let cases = [
            (SiteError::validation("email is required"), 400),
            (SiteError::upstream(Some(429), "quota"), 429),
            (SiteError::upstream(Some(200), "odd"), 502),
            (SiteError::upstream(None, "gone"), 502),
            (SiteError::Timeout("gemini".into()), 504),
            (SiteError::malformed("not json"), 502),
            (SiteError::Network("refused".into()), 502),
            (SiteError::Storage("locked".into()), 500),
            (SiteError::config("bad"), 500),
        ];
        for (err, expected) in cases {
            let label = err.kind();
            assert_eq!(ApiError::from(err).status().as_u16(), expected, "{label}");
        }
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
    }
}

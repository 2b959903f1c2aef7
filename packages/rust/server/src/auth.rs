//! Admin bearer-key check for the import and CRUD routes.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use crate::AppState;
use crate::error::ApiError;

/// Admin authentication settings.
#[derive(Debug, Clone, Default)]
pub struct AdminAuth {
    /// Expected bearer key. `None` leaves the admin routes open unless
    /// `required` is set.
    pub key: Option<String>,
    /// Reject every admin request when no key is configured.
    pub required: bool,
}

impl AdminAuth {
    /// Whether a request carrying `header` may pass.
    pub fn allows(&self, header: Option<&str>) -> bool {
        match &self.key {
            None => !self.required,
            Some(expected) => header
                .and_then(|h| h.trim().split_once(' '))
                .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
                .is_some_and(|(_, token)| token.trim() == expected),
        }
    }
}

/// Middleware guarding the admin routes.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    if !state.admin.allows(header) {
        tracing::debug!(path = %request.uri().path(), "admin request rejected");
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_when_no_key_configured() {
        let auth = AdminAuth::default();
        assert!(auth.allows(None));
        assert!(auth.allows(Some("Bearer anything")));
    }

    #[test]
    fn fails_closed_when_required_without_key() {
        let auth = AdminAuth {
            key: None,
            required: true,
        };
        assert!(!auth.allows(None));
        assert!(!auth.allows(Some("Bearer anything")));
    }

    #[test]
    fn matches_bearer_key() {
        let auth = AdminAuth {
            key: Some("s3cret".into()),
            required: false,
        };
        assert!(auth.allows(Some("Bearer s3cret")));
        assert!(!auth.allows(Some("Bearer wrong")));
        assert!(!auth.allows(Some("s3cret")));
        assert!(!auth.allows(None));
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        let auth = AdminAuth {
            key: Some("s3cret".into()),
            required: false,
        };
        assert!(auth.allows(Some("bearer s3cret")));
        assert!(auth.allows(Some("BEARER s3cret")));
        assert!(!auth.allows(Some("Basic s3cret")));
        assert!(!auth.allows(Some("Bearers3cret")));
    }
}

//! Route definitions.

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::auth::require_admin;
use crate::handlers;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let admin = Router::new()
        .route(
            "/api/import",
            post(handlers::import).layer(DefaultBodyLimit::max(state.max_upload_bytes)),
        )
        .route(
            "/api/admin/tables/:table",
            get(handlers::list_rows)
                .post(handlers::create_row)
                .put(handlers::update_row)
                .delete(handlers::delete_row),
        )
        .route("/api/admin/generate", post(handlers::generate))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/contact", post(handlers::contact))
        .route("/api/quote", post(handlers::quote))
        .route("/api/guide-download", post(handlers::guide_download))
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

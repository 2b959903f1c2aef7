//! HTTP server for the EcoSpray backend.
//!
//! Exposes the public lead forms, the admin site-import stages, table CRUD
//! and copy drafting over one axum router.

mod auth;
mod error;
mod handlers;
mod routes;

pub use auth::AdminAuth;
pub use error::ApiError;
pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use ecospray_core::{CrmClient, ImportService};
use ecospray_shared::{AppConfig, Result, SiteError, secret_from_env};
use ecospray_storage::{TabularStore, open_store};

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    /// The server's own tabular store.
    pub store: Arc<dyn TabularStore>,
    pub import: Arc<ImportService>,
    /// `None` when no CRM is configured.
    pub crm: Option<Arc<CrmClient>>,
    pub admin: AdminAuth,
    /// Source tag stamped on leads.
    pub source_tag: String,
    /// Upload limit for the import route, in bytes.
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Build state around an already opened store.
    pub fn new(config: &AppConfig, store: Arc<dyn TabularStore>) -> Result<Self> {
        let import = ImportService::new(config, store.clone())?;
        let crm = CrmClient::from_config(&config.crm)?.map(Arc::new);

        Ok(Self {
            store,
            import: Arc::new(import),
            crm,
            admin: AdminAuth {
                key: secret_from_env(&config.server.admin_key_env),
                required: config.server.require_admin_key,
            },
            source_tag: config.site.source_tag.clone(),
            max_upload_bytes: config.server.max_upload_mb.saturating_mul(1024 * 1024),
        })
    }

    /// Open the configured store and build state around it.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let store = open_store(&config.store).await?;
        Self::new(config, store)
    }
}

/// Start the web server.
pub async fn serve(config: &AppConfig, host: &str, port: u16) -> Result<()> {
    let state = AppState::from_config(config).await?;

    if state.admin.key.is_none() {
        if state.admin.required {
            tracing::warn!(
                env = %config.server.admin_key_env,
                "no admin key set and require_admin_key is on: admin routes will reject every request"
            );
        } else {
            tracing::warn!(
                env = %config.server.admin_key_env,
                "no admin key set: admin routes are open to anyone"
            );
        }
    }
    if state.crm.is_none() {
        tracing::info!("no CRM configured, leads are stored locally only");
    }

    let app = create_router(state);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| SiteError::config(format!("invalid listen address {host}:{port}: {e}")))?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| SiteError::io(addr.to_string(), e))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| SiteError::io(addr.to_string(), e))?;

    Ok(())
}

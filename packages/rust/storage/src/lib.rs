//! Tabular store for site content, leads and events.
//!
//! The [`TabularStore`] trait abstracts a spreadsheet-like store of named
//! tables with a fixed column list each. Two backends exist:
//! - [`SheetsStore`]: Google Sheets v4 REST API
//! - [`LocalStore`]: a libSQL file, for offline development and tests
//!
//! Row indexes are 0-based positions among data rows; the header row is not
//! counted.

mod local;
mod migrations;
pub mod schema;
mod sheets;

use std::sync::Arc;

use async_trait::async_trait;

use ecospray_shared::{Result, SiteError, StoreBackend, StoreConfig, secret_from_env};

pub use local::LocalStore;
pub use schema::{Row, Table, cell_text};
pub use sheets::SheetsStore;

/// Row-level access to the content tables.
#[async_trait]
pub trait TabularStore: Send + Sync {
    /// All data rows, in order.
    async fn read_rows(&self, table: Table) -> Result<Vec<Row>>;

    /// Append rows after the last data row. Returns the number written.
    async fn append_rows(&self, table: Table, rows: &[Row]) -> Result<usize>;

    /// Overwrite the data row at `index`.
    async fn update_row(&self, table: Table, index: usize, row: &Row) -> Result<()>;

    /// Remove the data row at `index`; later rows move up.
    async fn delete_row(&self, table: Table, index: usize) -> Result<()>;

    /// Clear every data row, then write `rows`. Returns the number written.
    async fn replace_rows(&self, table: Table, rows: &[Row]) -> Result<usize>;
}

/// Open the server's own store as configured.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn TabularStore>> {
    match config.backend {
        StoreBackend::Local => {
            let store = LocalStore::open(std::path::Path::new(&config.local_path)).await?;
            Ok(Arc::new(store))
        }
        StoreBackend::Sheets => {
            let spreadsheet_id = config.spreadsheet_id.as_deref().ok_or_else(|| {
                SiteError::config("store.spreadsheet_id is required for the sheets backend")
            })?;
            let token = secret_from_env(&config.access_token_env).ok_or_else(|| {
                SiteError::config(format!(
                    "{} must be set for the sheets backend",
                    config.access_token_env
                ))
            })?;
            Ok(Arc::new(SheetsStore::new(config, spreadsheet_id, &token)?))
        }
    }
}

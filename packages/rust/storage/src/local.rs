//! libSQL-backed tabular store for offline development and tests.

use std::path::Path;

use async_trait::async_trait;
use libsql::{Connection, Database, params, params_from_iter};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use ecospray_shared::{Result, SiteError};

use crate::TabularStore;
use crate::migrations::{self, quote_ident};
use crate::schema::{Row, Table};

fn storage_err(e: libsql::Error) -> SiteError {
    SiteError::Storage(e.to_string())
}

/// A local libSQL file holding one SQL table per sheet.
pub struct LocalStore {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    /// Serializes multi-statement writes (index lookups, clear-and-rewrite).
    write_lock: Mutex<()>,
}

impl LocalStore {
    /// Open or create a database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SiteError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let store = Self {
            db,
            conn,
            write_lock: Mutex::new(()),
        };
        store.run_migrations().await?;
        info!(path = %path.display(), "local store opened");
        Ok(store)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(&migration.sql)
                    .await
                    .map_err(|e| {
                        SiteError::Storage(format!("migration v{} failed: {e}", migration.version))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// `row_id` of the data row at 0-based `index`.
    async fn row_id_at(&self, table: Table, index: usize) -> Result<i64> {
        let sql = format!(
            "SELECT row_id FROM {} ORDER BY row_id LIMIT 1 OFFSET ?1",
            quote_ident(table.name())
        );
        let mut rows = self
            .conn
            .query(&sql, params![index as i64])
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => row.get::<i64>(0).map_err(storage_err),
            None => Err(SiteError::validation(format!(
                "row {index} does not exist in {table}"
            ))),
        }
    }

    async fn insert_rows(conn: &Connection, table: Table, rows: &[Row]) -> Result<()> {
        let columns = table.columns();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table.name()),
            columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
            placeholders.join(", ")
        );

        for row in rows {
            conn.execute(&sql, params_from_iter(aligned(table, row)))
                .await
                .map_err(storage_err)?;
        }
        Ok(())
    }
}

/// Pad or cut a row to the table's column count.
fn aligned(table: Table, row: &[String]) -> Vec<String> {
    let width = table.columns().len();
    let mut cells: Vec<String> = row.iter().take(width).cloned().collect();
    cells.resize(width, String::new());
    cells
}

#[async_trait]
impl TabularStore for LocalStore {
    async fn read_rows(&self, table: Table) -> Result<Vec<Row>> {
        let columns = table.columns();
        let sql = format!(
            "SELECT {} FROM {} ORDER BY row_id",
            columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
            quote_ident(table.name())
        );
        let mut rows = self.conn.query(&sql, params![]).await.map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let mut cells = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                cells.push(row.get::<String>(i as i32).map_err(storage_err)?);
            }
            results.push(cells);
        }
        Ok(results)
    }

    async fn append_rows(&self, table: Table, rows: &[Row]) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        Self::insert_rows(&self.conn, table, rows).await?;
        debug!(%table, rows = rows.len(), "rows appended");
        Ok(rows.len())
    }

    async fn update_row(&self, table: Table, index: usize, row: &Row) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let row_id = self.row_id_at(table, index).await?;

        let columns = table.columns();
        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", quote_ident(c), i + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE row_id = ?{}",
            quote_ident(table.name()),
            assignments.join(", "),
            columns.len() + 1
        );

        let mut values: Vec<libsql::Value> = aligned(table, row)
            .into_iter()
            .map(libsql::Value::Text)
            .collect();
        values.push(libsql::Value::Integer(row_id));

        self.conn
            .execute(&sql, params_from_iter(values))
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn delete_row(&self, table: Table, index: usize) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let row_id = self.row_id_at(table, index).await?;
        let sql = format!("DELETE FROM {} WHERE row_id = ?1", quote_ident(table.name()));
        self.conn
            .execute(&sql, params![row_id])
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn replace_rows(&self, table: Table, rows: &[Row]) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let sql = format!("DELETE FROM {}", quote_ident(table.name()));

        // The clear and the rewrite commit together or not at all.
        let tx = self.conn.transaction().await.map_err(storage_err)?;
        let rewritten = async {
            tx.execute(&sql, params![]).await.map_err(storage_err)?;
            Self::insert_rows(&tx, table, rows).await
        }
        .await;

        if let Err(e) = rewritten {
            if let Err(rollback) = tx.rollback().await {
                warn!(%table, error = %rollback, "rollback failed");
            }
            return Err(e);
        }
        tx.commit().await.map_err(storage_err)?;
        debug!(%table, rows = rows.len(), "rows replaced");
        Ok(rows.len())
    }
}

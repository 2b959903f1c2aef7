//! Writes extracted content and bookkeeping rows into a [`TabularStore`].

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use ecospray_shared::{ExtractedContent, Record, Result};
use ecospray_storage::{Row, Table, TabularStore, cell_text};

/// A category whose write failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryFailure {
    pub category: String,
    pub error: String,
}

/// Outcome of [`write_imported_content`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct WriteReport {
    /// Rows written per category that succeeded.
    pub counts: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<CategoryFailure>,
}

impl WriteReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Human-readable summary of the failed categories.
    pub fn failure_message(&self) -> String {
        let parts: Vec<String> = self
            .failures
            .iter()
            .map(|f| format!("{}: {}", f.category, f.error))
            .collect();
        format!("failed to write {}", parts.join("; "))
    }
}

/// Content category → destination table.
fn category_table(category: &str) -> Option<Table> {
    match category {
        "pages" => Some(Table::Pages),
        "services" => Some(Table::Services),
        "testimonials" => Some(Table::Testimonials),
        "blog_posts" => Some(Table::BlogPosts),
        "stats" => Some(Table::Stats),
        "navigation" => Some(Table::Navigation),
        _ => None,
    }
}

/// Write every present category, each independently.
///
/// Record categories are appended; `site_config` replaces the whole table.
#[instrument(skip_all)]
pub async fn write_imported_content(
    store: &dyn TabularStore,
    content: &ExtractedContent,
) -> WriteReport {
    let start_time = Instant::now();
    let mut report = WriteReport::default();

    for (category, records) in content.record_categories() {
        let Some(table) = category_table(category) else {
            continue;
        };
        let rows: Vec<Row> = records.iter().map(|r| table.to_row(r)).collect();
        match store.append_rows(table, &rows).await {
            Ok(written) => {
                report.counts.insert(category.to_string(), written);
            }
            Err(e) => {
                warn!(category, error = %e, "category write failed");
                report.failures.push(CategoryFailure {
                    category: category.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    if let Some(config) = &content.site_config {
        match store.replace_rows(Table::SiteConfig, &config_rows(config)).await {
            Ok(written) => {
                report.counts.insert("site_config".into(), written);
            }
            Err(e) => {
                warn!(error = %e, "site_config write failed");
                report.failures.push(CategoryFailure {
                    category: "site_config".into(),
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        counts = ?report.counts,
        failures = report.failures.len(),
        duration_ms = start_time.elapsed().as_millis(),
        "content written"
    );
    report
}

fn config_rows(config: &Record) -> Vec<Row> {
    config
        .iter()
        .map(|(key, value)| vec![key.clone(), cell_text(value)])
        .collect()
}

/// Set one `site_config` key: update its row if present, else append.
pub async fn upsert_site_config(store: &dyn TabularStore, key: &str, value: &Value) -> Result<()> {
    let row = vec![key.to_string(), cell_text(value)];
    let existing = store.read_rows(Table::SiteConfig).await?;

    match existing.iter().position(|r| r.first().map(String::as_str) == Some(key)) {
        Some(index) => store.update_row(Table::SiteConfig, index, &row).await,
        None => store.append_rows(Table::SiteConfig, &[row]).await.map(|_| ()),
    }
}

/// Append one `0n_events` row.
pub async fn append_event(
    store: &dyn TabularStore,
    event_type: &str,
    source: &str,
    payload: &Value,
) -> Result<()> {
    let row = vec![
        Uuid::now_v7().to_string(),
        event_type.to_string(),
        source.to_string(),
        payload.to_string(),
        Utc::now().to_rfc3339(),
    ];
    store.append_rows(Table::Events, &[row]).await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ecospray_shared::SiteError;
    use ecospray_storage::LocalStore;
    use serde_json::json;

    async fn test_store() -> LocalStore {
        let tmp = std::env::temp_dir().join(format!("ecospray_writer_{}.db", Uuid::now_v7()));
        LocalStore::open(&tmp).await.expect("open test db")
    }

    fn content(value: Value) -> ExtractedContent {
        serde_json::from_value(value).expect("content")
    }

    #[tokio::test]
    async fn empty_category_reports_zero() {
        let store = test_store().await;
        let report = write_imported_content(&store, &content(json!({"services": []}))).await;
        assert!(report.is_complete());
        assert_eq!(report.counts.get("services"), Some(&0));
        assert!(!report.counts.contains_key("pages"));
        assert!(store.read_rows(Table::Services).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn records_are_shaped_to_columns() {
        let store = test_store().await;
        let report = write_imported_content(
            &store,
            &content(json!({
                "testimonials": [
                    {"name": "Pat R.", "quote": "Our attic is finally comfortable.", "rating": 5, "sparkle": true}
                ]
            })),
        )
        .await;
        assert_eq!(report.counts.get("testimonials"), Some(&1));

        let rows = store.read_rows(Table::Testimonials).await.unwrap();
        assert_eq!(rows[0][1], "Pat R.");
        assert_eq!(rows[0][4], "5");
        assert_eq!(rows[0].len(), Table::Testimonials.columns().len());
    }

    #[tokio::test]
    async fn site_config_is_replaced_not_merged() {
        let store = test_store().await;
        write_imported_content(
            &store,
            &content(json!({"site_config": {"theme": "light", "locale": "en"}})),
        )
        .await;
        let report =
            write_imported_content(&store, &content(json!({"site_config": {"theme": "dark"}})))
                .await;
        assert_eq!(report.counts.get("site_config"), Some(&1));

        let rows = store.read_rows(Table::SiteConfig).await.unwrap();
        assert_eq!(rows, vec![vec!["theme".to_string(), "dark".to_string()]]);
    }

    #[tokio::test]
    async fn upsert_updates_existing_key() {
        let store = test_store().await;
        upsert_site_config(&store, "phone", &json!("555-123-4567")).await.unwrap();
        upsert_site_config(&store, "email", &json!("info@ecospray.example.com")).await.unwrap();
        upsert_site_config(&store, "phone", &json!("555-987-6543")).await.unwrap();

        let rows = store.read_rows(Table::SiteConfig).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["phone".to_string(), "555-987-6543".to_string()]);
    }

    /// Store whose `services` table always fails.
    struct FlakyServices(LocalStore);

    #[async_trait]
    impl TabularStore for FlakyServices {
        async fn read_rows(&self, table: Table) -> Result<Vec<Row>> {
            self.0.read_rows(table).await
        }
        async fn append_rows(&self, table: Table, rows: &[Row]) -> Result<usize> {
            if table == Table::Services {
                return Err(SiteError::upstream(Some(403), "quota exceeded"));
            }
            self.0.append_rows(table, rows).await
        }
        async fn update_row(&self, table: Table, index: usize, row: &Row) -> Result<()> {
            self.0.update_row(table, index, row).await
        }
        async fn delete_row(&self, table: Table, index: usize) -> Result<()> {
            self.0.delete_row(table, index).await
        }
        async fn replace_rows(&self, table: Table, rows: &[Row]) -> Result<usize> {
            self.0.replace_rows(table, rows).await
        }
    }

    #[tokio::test]
    async fn failed_category_does_not_stop_others() {
        let store = FlakyServices(test_store().await);
        let report = write_imported_content(
            &store,
            &content(json!({
                "pages": [{"title": "Home"}],
                "services": [{"title": "Attic"}],
                "stats": [{"label": "Homes", "value": "1200"}]
            })),
        )
        .await;

        assert!(!report.is_complete());
        assert_eq!(report.failures[0].category, "services");
        assert_eq!(report.counts.get("pages"), Some(&1));
        assert_eq!(report.counts.get("stats"), Some(&1));
        assert!(report.failure_message().contains("services: quota exceeded"));
    }
}

//! Fixed table registry and row shaping.
//!
//! Every table ("sheet") has an ordered column list. Records coming from the
//! AI or the admin panel are keyed by column name; rows are positional.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use ecospray_shared::{Record, SiteError};

/// One positional row, aligned to its table's columns.
pub type Row = Vec<String>;

/// The closed set of tables the backend reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Pages,
    Services,
    Testimonials,
    BlogPosts,
    Stats,
    Navigation,
    SiteConfig,
    Contacts,
    Activities,
    Events,
}

impl Table {
    /// All tables, in spreadsheet tab order.
    pub const fn all() -> &'static [Table] {
        &[
            Table::Pages,
            Table::Services,
            Table::Testimonials,
            Table::BlogPosts,
            Table::Stats,
            Table::Navigation,
            Table::SiteConfig,
            Table::Contacts,
            Table::Activities,
            Table::Events,
        ]
    }

    /// Sheet and SQL table name.
    pub fn name(&self) -> &'static str {
        match self {
            Table::Pages => "pages",
            Table::Services => "services",
            Table::Testimonials => "testimonials",
            Table::BlogPosts => "blog_posts",
            Table::Stats => "stats",
            Table::Navigation => "navigation",
            Table::SiteConfig => "site_config",
            Table::Contacts => "contacts",
            Table::Activities => "activities",
            Table::Events => "0n_events",
        }
    }

    /// Ordered column names; the header row of the sheet.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Table::Pages => &[
                "id",
                "slug",
                "title",
                "meta_description",
                "hero_heading",
                "hero_subheading",
                "content",
                "status",
                "sort_order",
                "updated_at",
            ],
            Table::Services => &[
                "id",
                "slug",
                "title",
                "short_description",
                "description",
                "icon",
                "image_url",
                "features",
                "sort_order",
                "status",
            ],
            Table::Testimonials => &[
                "id",
                "name",
                "location",
                "quote",
                "rating",
                "service",
                "featured",
                "sort_order",
            ],
            Table::BlogPosts => &[
                "id",
                "slug",
                "title",
                "excerpt",
                "content",
                "author",
                "cover_image",
                "tags",
                "status",
                "published_at",
            ],
            Table::Stats => &["id", "label", "value", "suffix", "sort_order"],
            Table::Navigation => &["id", "label", "url", "parent", "location", "sort_order"],
            Table::SiteConfig => &["key", "value"],
            Table::Contacts => &[
                "id",
                "first_name",
                "last_name",
                "email",
                "phone",
                "company",
                "address",
                "service_interest",
                "message",
                "source",
                "tags",
                "created_at",
            ],
            Table::Activities => &["id", "contact_id", "type", "description", "created_at"],
            Table::Events => &["id", "event_type", "source", "payload", "created_at"],
        }
    }

    /// Shape a keyed record into a row: unknown keys are dropped and missing
    /// columns become empty strings.
    pub fn to_row(&self, record: &Record) -> Row {
        self.columns()
            .iter()
            .map(|col| record.get(*col).map(cell_text).unwrap_or_default())
            .collect()
    }

    /// Key a positional row by column name. Short rows are padded with `""`.
    pub fn to_record(&self, row: &[String]) -> Record {
        self.columns()
            .iter()
            .enumerate()
            .map(|(i, col)| {
                let cell = row.get(i).cloned().unwrap_or_default();
                (col.to_string(), Value::String(cell))
            })
            .collect()
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Table {
    type Err = SiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::all()
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| SiteError::validation(format!("unknown table '{s}'")))
    }
}

/// Render one JSON value as a cell.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(items) if items.iter().all(is_scalar) => items
            .iter()
            .map(cell_text)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn every_table_round_trips_its_name() {
        for table in Table::all() {
            assert_eq!(table.name().parse::<Table>().unwrap(), *table);
            assert!(!table.columns().is_empty());
        }
    }

    #[test]
    fn unknown_table_is_rejected() {
        let err = "users".parse::<Table>().unwrap_err();
        assert!(matches!(err, SiteError::Validation { .. }));
        assert!(err.to_string().contains("users"));
    }

    #[test]
    fn row_drops_unknown_keys_and_fills_missing() {
        let rec = record(json!({
            "title": "Attic Insulation",
            "slug": "attic",
            "hero_color": "green"
        }));
        let row = Table::Services.to_row(&rec);
        assert_eq!(row.len(), Table::Services.columns().len());
        assert_eq!(row[1], "attic");
        assert_eq!(row[2], "Attic Insulation");
        assert!(!row.contains(&"green".to_string()));
        assert_eq!(row[0], "");
    }

    #[test]
    fn cells_are_rendered_from_json() {
        assert_eq!(cell_text(&json!(null)), "");
        assert_eq!(cell_text(&json!(5)), "5");
        assert_eq!(cell_text(&json!(true)), "true");
        assert_eq!(cell_text(&json!(["R-49", "air sealing"])), "R-49, air sealing");
        assert_eq!(cell_text(&json!({"a": 1})), r#"{"a":1}"#);
        assert_eq!(cell_text(&json!([{"a": 1}])), r#"[{"a":1}]"#);
    }

    #[test]
    fn record_pads_short_rows() {
        let rec = Table::Stats.to_record(&["s1".into(), "Homes insulated".into()]);
        assert_eq!(rec["label"], json!("Homes insulated"));
        assert_eq!(rec["suffix"], json!(""));
        assert_eq!(rec.len(), 5);
    }
}

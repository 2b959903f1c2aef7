//! SQL migration definitions for the local tabular store.
//!
//! Migrations are applied in order on database open. Each sheet becomes one SQL
//! table with a hidden `row_id` that fixes row order, plus one TEXT column per
//! schema column.

use crate::schema::Table;

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: String,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    let mut sql = String::from(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);
",
    );
    for table in Table::all() {
        sql.push_str(&create_table_sql(*table));
    }
    sql.push_str("INSERT INTO schema_migrations (version) VALUES (1);\n");

    vec![Migration {
        version: 1,
        description: "Initial schema: one table per sheet",
        sql,
    }]
}

fn create_table_sql(table: Table) -> String {
    let columns: Vec<String> = table
        .columns()
        .iter()
        .map(|c| format!("    {} TEXT NOT NULL DEFAULT ''", quote_ident(c)))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    row_id INTEGER PRIMARY KEY AUTOINCREMENT,\n{}\n);\n",
        quote_ident(table.name()),
        columns.join(",\n")
    )
}

/// Double-quote an SQL identifier (`0n_events` and `type` need it).
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_table_name_is_quoted() {
        let sql = create_table_sql(Table::Events);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"0n_events\""));
        assert!(sql.contains("\"payload\" TEXT NOT NULL DEFAULT ''"));
    }
}

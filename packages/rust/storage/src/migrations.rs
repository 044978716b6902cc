//! SQL migration definitions for the field mapping database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: field_mappings",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Admin-managed field mappings, in registration order
CREATE TABLE IF NOT EXISTS field_mappings (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    model_name  TEXT NOT NULL,
    field_name  TEXT NOT NULL,
    field_kind  TEXT NOT NULL,
    is_custom   INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL,
    UNIQUE(model_name, field_name, is_custom)
);

CREATE INDEX IF NOT EXISTS idx_field_mappings_model ON field_mappings(model_name);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}

//! libSQL storage for admin-managed field mappings.
//!
//! Mappings added through `netwiki fields add` live here and are loaded into
//! the field registry at startup, after the mappings from the config file.
//!
//! **Access rules:**
//! - `netwiki fields add|remove`: read-write via [`Storage::open`]
//! - `netwiki serve|apply|fields list`: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, Row, params};
use netwiki_shared::{FieldKind, FieldMapping, NetWikiError, Result, validate_entity_kind};

/// A field mapping row as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMapping {
    pub id: i64,
    pub mapping: FieldMapping,
    /// RFC 3339 timestamp.
    pub created_at: String,
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

fn db_err(e: libsql::Error) -> NetWikiError {
    NetWikiError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| NetWikiError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(NetWikiError::Storage(format!(
                "database not found: {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        NetWikiError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
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
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(NetWikiError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Field mapping operations
    // -----------------------------------------------------------------------

    /// Insert a mapping and return its row id.
    ///
    /// A mapping with the same model, field and custom flag is rejected.
    pub async fn insert_mapping(&self, mapping: &FieldMapping) -> Result<i64> {
        self.check_writable()?;
        validate_entity_kind(&mapping.model)?;
        if mapping.field.trim().is_empty() {
            return Err(NetWikiError::validation("field name must not be empty"));
        }

        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .execute(
                "INSERT INTO field_mappings (model_name, field_name, field_kind, is_custom, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(model_name, field_name, is_custom) DO NOTHING",
                params![
                    mapping.model.as_str(),
                    mapping.field.as_str(),
                    mapping.kind.as_str(),
                    i64::from(mapping.custom),
                    now.as_str()
                ],
            )
            .await
            .map_err(db_err)?;

        if changed == 0 {
            return Err(NetWikiError::validation(format!(
                "field mapping already exists: {mapping}"
            )));
        }

        let id = self.conn.last_insert_rowid();
        tracing::info!(id, %mapping, "stored field mapping");
        Ok(id)
    }

    /// List mappings in insertion order, optionally for one model only.
    pub async fn list_mappings(&self, model: Option<&str>) -> Result<Vec<StoredMapping>> {
        let mut rows = match model {
            Some(model) => {
                self.conn
                    .query(
                        "SELECT id, model_name, field_name, field_kind, is_custom, created_at
                         FROM field_mappings WHERE model_name = ?1 ORDER BY id",
                        params![model],
                    )
                    .await
            }
            None => {
                self.conn
                    .query(
                        "SELECT id, model_name, field_name, field_kind, is_custom, created_at
                         FROM field_mappings ORDER BY id",
                        params![],
                    )
                    .await
            }
        }
        .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(stored_mapping(&row)?);
        }
        Ok(results)
    }

    /// All mappings in insertion order, ready for registry construction.
    pub async fn mappings(&self) -> Result<Vec<FieldMapping>> {
        Ok(self
            .list_mappings(None)
            .await?
            .into_iter()
            .map(|stored| stored.mapping)
            .collect())
    }

    /// Delete one mapping. Returns `false` if no such mapping was stored.
    pub async fn delete_mapping(&self, model: &str, field: &str, custom: bool) -> Result<bool> {
        self.check_writable()?;
        let changed = self
            .conn
            .execute(
                "DELETE FROM field_mappings
                 WHERE model_name = ?1 AND field_name = ?2 AND is_custom = ?3",
                params![model, field, i64::from(custom)],
            )
            .await
            .map_err(db_err)?;

        if changed > 0 {
            tracing::info!(model, field, custom, "deleted field mapping");
        }
        Ok(changed > 0)
    }
}

fn stored_mapping(row: &Row) -> Result<StoredMapping> {
    let kind: String = row.get(3).map_err(db_err)?;
    let kind = kind.parse::<FieldKind>().map_err(|e| {
        NetWikiError::Storage(format!("corrupt field_kind in field_mappings: {e}"))
    })?;

    Ok(StoredMapping {
        id: row.get::<i64>(0).map_err(db_err)?,
        mapping: FieldMapping {
            model: row.get::<String>(1).map_err(db_err)?,
            field: row.get::<String>(2).map_err(db_err)?,
            kind,
            custom: row.get::<i64>(4).map_err(db_err)? != 0,
        },
        created_at: row.get::<String>(5).map_err(db_err)?,
    })
}

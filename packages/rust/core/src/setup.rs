//! Startup wiring: build the field registry from config and storage.

use tracing::{debug, info, instrument};

use netwiki_fields::FieldRegistry;
use netwiki_shared::{AppConfig, Result};
use netwiki_storage::Storage;

/// Build the registry: config `[[fields]]` first, then stored mappings.
///
/// A missing database is not an error; it just contributes no mappings.
#[instrument(skip_all)]
pub async fn load_registry(config: &AppConfig) -> Result<FieldRegistry> {
    let mut builder = FieldRegistry::builder();
    builder.register_all(config.fields.iter().cloned())?;

    let db_path = config.storage.database_path()?;
    let stored = if db_path.exists() {
        let storage = Storage::open_readonly(&db_path).await?;
        storage.mappings().await?
    } else {
        debug!(path = %db_path.display(), "no field mapping database");
        Vec::new()
    };
    let stored_count = stored.len();
    builder.register_all(stored)?;

    let registry = builder.build();
    info!(
        configured = config.fields.len(),
        stored = stored_count,
        models = registry.models().len(),
        "field registry loaded"
    );
    Ok(registry)
}

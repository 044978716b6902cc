//! Field registry: which fields to synchronize for each entity kind.
//!
//! Built once at startup from the config file's `[[fields]]` entries and the
//! field mapping store, then shared read-only by every update.

use std::collections::HashMap;

use tracing::debug;

use netwiki_shared::{FieldMapping, NetWikiError, Result, WebhookPayload};

use crate::descriptor::FieldDescriptor;

/// Read-only mapping from entity kind to its ordered field mappings.
#[derive(Debug, Clone, Default)]
pub struct FieldRegistry {
    by_model: HashMap<String, Vec<FieldMapping>>,
}

impl FieldRegistry {
    pub fn builder() -> FieldRegistryBuilder {
        FieldRegistryBuilder::default()
    }

    /// Mappings for `entity_kind`, in registration order. Empty if none.
    pub fn resolve(&self, entity_kind: &str) -> &[FieldMapping] {
        self.by_model
            .get(entity_kind)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Bind every mapping for the payload's entity kind to its value.
    ///
    /// Fails on the first field missing from the payload.
    pub fn resolve_fields(&self, payload: &WebhookPayload) -> Result<Vec<FieldDescriptor>> {
        self.resolve(&payload.model)
            .iter()
            .map(|mapping| bind(mapping, payload))
            .collect()
    }

    /// Total number of mappings across all entity kinds.
    pub fn len(&self) -> usize {
        self.by_model.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entity kinds with at least one mapping, sorted.
    pub fn models(&self) -> Vec<&str> {
        let mut models: Vec<&str> = self.by_model.keys().map(String::as_str).collect();
        models.sort_unstable();
        models
    }
}

/// Look up a mapping's value in the payload and build its descriptor.
pub fn bind(mapping: &FieldMapping, payload: &WebhookPayload) -> Result<FieldDescriptor> {
    let value = if mapping.custom {
        payload.custom_field(&mapping.field)
    } else {
        payload.field(&mapping.field)
    };

    match value {
        Some(value) => Ok(FieldDescriptor::new(
            mapping.field.clone(),
            value.clone(),
            mapping.kind,
            mapping.custom,
        )),
        None => Err(NetWikiError::UnknownFieldMapping {
            model: mapping.model.clone(),
            field: mapping.field.clone(),
            custom: mapping.custom,
        }),
    }
}

/// Explicit registration table for a [`FieldRegistry`].
#[derive(Debug, Default)]
pub struct FieldRegistryBuilder {
    by_model: HashMap<String, Vec<FieldMapping>>,
}

impl FieldRegistryBuilder {
    /// Register one mapping. Registering the same model/field/custom triple
    /// twice is a configuration error.
    pub fn register(&mut self, mapping: FieldMapping) -> Result<&mut Self> {
        let fields = self.by_model.entry(mapping.model.clone()).or_default();
        if fields
            .iter()
            .any(|m| m.field == mapping.field && m.custom == mapping.custom)
        {
            return Err(NetWikiError::config(format!(
                "field mapping registered twice: {mapping}"
            )));
        }
        debug!(%mapping, "registered field mapping");
        fields.push(mapping);
        Ok(self)
    }

    /// Register several mappings in order.
    pub fn register_all(
        &mut self,
        mappings: impl IntoIterator<Item = FieldMapping>,
    ) -> Result<&mut Self> {
        for mapping in mappings {
            self.register(mapping)?;
        }
        Ok(self)
    }

    pub fn build(self) -> FieldRegistry {
        FieldRegistry {
            by_model: self.by_model,
        }
    }
}

//! Field descriptors and the field registry.
//!
//! - [`FieldDescriptor`] — one field's value for one update, with its extraction policy
//! - [`FieldRegistry`] — configured field mappings per entity kind, built once at startup

pub mod descriptor;
pub mod registry;

pub use descriptor::FieldDescriptor;
pub use registry::{FieldRegistry, FieldRegistryBuilder};

//! Shared types, error model, and configuration for NetWiki.
//!
//! This crate is the foundation depended on by all other NetWiki crates.
//! It provides:
//! - [`NetWikiError`] — the unified error type
//! - Domain types ([`WebhookPayload`], [`FieldKind`], [`FieldMapping`])
//! - Configuration ([`AppConfig`], [`ConfluenceSettings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ConfluenceConfig, ConfluenceSettings, StorageConfig, WebhookConfig,
    WebhookSettings, config_dir, config_file_path, init_config, init_config_at, load_config,
    load_config_from,
};
pub use error::{NetWikiError, Outcome, Result};
pub use types::{CUSTOM_FIELD_PREFIX, FieldKind, FieldMapping, WebhookPayload, validate_entity_kind};

//! Update orchestration for NetWiki.
//!
//! This crate ties together the field registry, the content patcher and the
//! page store into the end-to-end update flow ([`UpdateOrchestrator`]), and
//! builds the registry from configuration and the field mapping store.

pub mod setup;
pub mod update;

pub use setup::load_registry;
pub use update::{PAGE_TITLE_PREFIX, UpdateOrchestrator, UpdateReport, page_title};

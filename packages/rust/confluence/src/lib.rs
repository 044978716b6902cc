//! Page content store: the fetch-or-create / push boundary to the wiki.
//!
//! [`PageStore`] is the seam the update orchestrator is generic over.
//! [`ConfluenceStore`] talks to the Confluence Server / Data Center REST API;
//! [`MemoryPageStore`] keeps pages in memory for tests and dry runs.

mod client;
mod memory;
mod wire;

use std::future::Future;

use netwiki_shared::Result;

pub use client::ConfluenceStore;
pub use memory::MemoryPageStore;

/// A page as fetched from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContent {
    /// Remote identifier, used for the push.
    pub id: String,
    pub title: String,
    /// Storage-format body (XHTML fragment).
    pub body: String,
}

/// Remote page storage used by one update: one fetch, one push.
pub trait PageStore: Send + Sync {
    /// Fetch the page with `title`, creating it with an empty body if absent.
    fn fetch_or_create(&self, title: &str) -> impl Future<Output = Result<PageContent>> + Send;

    /// Replace the body of page `page_id`.
    fn push(
        &self,
        page_id: &str,
        title: &str,
        body: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

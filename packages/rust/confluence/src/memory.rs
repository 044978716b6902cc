//! In-memory page store for tests and dry runs.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use netwiki_shared::{NetWikiError, Result};

use crate::{PageContent, PageStore};

/// [`PageStore`] holding pages in a map keyed by page id.
#[derive(Debug, Default)]
pub struct MemoryPageStore {
    pages: Mutex<BTreeMap<String, PageContent>>,
    next_id: AtomicUsize,
    fetches: AtomicUsize,
    pushes: AtomicUsize,
}

impl MemoryPageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a page and return its id.
    pub fn insert(&self, title: impl Into<String>, body: impl Into<String>) -> String {
        let id = self.allocate_id();
        let page = PageContent {
            id: id.clone(),
            title: title.into(),
            body: body.into(),
        };
        self.lock().insert(id.clone(), page);
        id
    }

    /// Current content of the page with `title`.
    pub fn page(&self, title: &str) -> Option<PageContent> {
        self.lock().values().find(|p| p.title == title).cloned()
    }

    /// Number of pages held.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn push_count(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    fn allocate_id(&self) -> String {
        (self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, PageContent>> {
        self.pages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PageStore for MemoryPageStore {
    async fn fetch_or_create(&self, title: &str) -> Result<PageContent> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(page) = self.page(title) {
            return Ok(page);
        }
        let id = self.insert(title, "");
        Ok(PageContent {
            id,
            title: title.to_string(),
            body: String::new(),
        })
    }

    async fn push(&self, page_id: &str, title: &str, body: &str) -> Result<()> {
        let mut pages = self.lock();
        let page = pages
            .get_mut(page_id)
            .ok_or_else(|| NetWikiError::RemoteWrite(format!("no page with id {page_id}")))?;
        page.title = title.to_string();
        page.body = body.to_string();
        self.pushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

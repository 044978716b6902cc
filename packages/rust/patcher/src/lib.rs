//! Content patching for Confluence storage-format pages.
//!
//! This crate provides:
//! - [`PageDocument`] — a span-preserving document model: edits splice the
//!   original text, so everything outside a touched region keeps its bytes
//! - [`locate_region`] / [`locate_or_create_region`] / [`set_region_value`] —
//!   find-or-create-then-set over named multiexcerpt macros
//! - [`patch_field`] — the three steps composed for one field

pub mod document;
pub mod region;

pub use document::{CONTENT_NS, PageDocument, XHTML_NS};
pub use region::{
    MACRO_NAME, MarkedRegion, NAME_PARAMETER, PatchOutcome, locate_or_create_region,
    locate_region, patch_field, set_region_value,
};

#[cfg(test)]
mod tests {
    use super::*;

    fn load_fixture(name: &str) -> String {
        let path = format!("../../../fixtures/storage/{name}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    #[test]
    fn real_page_roundtrips_unchanged() {
        let body = load_fixture("partials-site.xml");
        let doc = PageDocument::from_storage_body(&body).expect("parse fixture");
        assert_eq!(doc.to_storage_body(), body);
    }

    #[test]
    fn real_page_updates_only_the_target_region() {
        let body = load_fixture("partials-site.xml");
        let mut doc = PageDocument::from_storage_body(&body).unwrap();

        let outcome = patch_field(&mut doc, "status", "Planned").unwrap();
        assert!(!outcome.created);
        assert_eq!(outcome.matches, 1);

        let patched = doc.to_storage_body();
        assert_eq!(patched, body.replace("<p>Active</p>", "<p>Planned</p>"));
    }

    #[test]
    fn real_page_gains_missing_region_before_trailing_element() {
        let body = load_fixture("partials-site.xml");
        let mut doc = PageDocument::from_storage_body(&body).unwrap();

        let outcome = patch_field(&mut doc, "custom_purpose", "Lab").unwrap();
        assert!(outcome.created);

        let patched = doc.to_storage_body();
        let region_at = patched.find(">custom_purpose<").expect("new region");
        let footer_at = patched.rfind("<p><em>Maintained by NetWiki").expect("footer");
        assert!(region_at < footer_at);
        // Everything before the insertion point is byte-identical.
        let insert_at = body.rfind("<p><em>Maintained by NetWiki").unwrap();
        assert_eq!(&patched[..insert_at], &body[..insert_at]);
        assert!(patched.ends_with(&body[insert_at..]));
    }
}

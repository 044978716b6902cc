//! Marked regions: locating, creating, and rewriting multiexcerpt macros.
//!
//! A marked region is an `ac:structured-macro` with a direct
//! `ac:parameter ac:name="MultiExcerptName"` child naming the field. Its value
//! lives in the first `p` of the macro's `ac:rich-text-body`.

use std::ops::Range;

use quick_xml::escape::partial_escape;
use tracing::debug;
use uuid::Uuid;

use netwiki_shared::{NetWikiError, Result};

use crate::document::{CONTENT_NS, ElementId, PageDocument};

/// Parameter holding the region name.
pub const NAME_PARAMETER: &str = "MultiExcerptName";

/// Macro name used for synthesized regions.
pub const MACRO_NAME: &str = "multiexcerpt";

/// Output-type parameter set on synthesized regions.
const OUTPUT_TYPE_PARAMETER: &str = "atlassian-macro-output-type";
const OUTPUT_TYPE: &str = "BLOCK";

// ---------------------------------------------------------------------------
// MarkedRegion
// ---------------------------------------------------------------------------

/// A located region for one field name.
///
/// Holds one text slot per matching macro (normally exactly one). It is bound
/// to the document revision it was located at; any mutation invalidates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkedRegion {
    field_name: String,
    revision: u64,
    slots: Vec<TextSlot>,
    created: bool,
}

impl MarkedRegion {
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// Number of matching macros.
    pub fn matches(&self) -> usize {
        self.slots.len()
    }

    /// Whether the region was synthesized by [`locate_or_create_region`].
    pub fn is_created(&self) -> bool {
        self.created
    }
}

/// Where a region's displayed value is written.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TextSlot {
    /// `<p>…</p>`: replace the content.
    Paragraph { content: Range<usize> },
    /// `<p/>`: expand the tag.
    EmptyParagraph { tag: Range<usize>, qname: String },
    /// Rich text body without a `p`: insert one at the start of the body.
    MissingParagraph { at: usize },
    /// `<ac:rich-text-body/>`: expand the tag around a new `p`.
    EmptyBody { tag: Range<usize>, qname: String },
    /// Macro without a rich text body: append one to the macro.
    MissingBody { at: usize, prefix: Option<String> },
}

impl TextSlot {
    fn edit(&self, source: &str, escaped: &str) -> (Range<usize>, String) {
        match self {
            Self::Paragraph { content } => (content.clone(), escaped.to_string()),
            Self::EmptyParagraph { tag, qname } => (
                tag.clone(),
                format!("{}>{escaped}</{qname}>", open_of_empty(&source[tag.clone()])),
            ),
            Self::MissingParagraph { at } => (*at..*at, format!("<p>{escaped}</p>")),
            Self::EmptyBody { tag, qname } => (
                tag.clone(),
                format!(
                    "{}><p>{escaped}</p></{qname}>",
                    open_of_empty(&source[tag.clone()])
                ),
            ),
            Self::MissingBody { at, prefix } => {
                let body = qualify(prefix.as_deref(), "rich-text-body");
                (*at..*at, format!("<{body}><p>{escaped}</p></{body}>"))
            }
        }
    }
}

/// `<p class="x"/>` → `<p class="x"`.
fn open_of_empty(tag: &str) -> &str {
    tag.trim_end_matches('>')
        .trim_end_matches('/')
        .trim_end()
}

fn qualify(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}

/// Region names compare with all whitespace removed, case-sensitively.
/// Stored names are hand-editable and pick up stray spaces.
fn compact(name: &str) -> String {
    name.chars().filter(|c| !c.is_whitespace()).collect()
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Find the region for `field_name` without touching the document.
pub fn locate_region(doc: &PageDocument, field_name: &str) -> Option<MarkedRegion> {
    let wanted = compact(field_name);
    if wanted.is_empty() {
        return None;
    }

    let mut macros: Vec<ElementId> = Vec::new();
    for param in doc.elements() {
        if !param.is(CONTENT_NS, "parameter")
            || param.attribute(CONTENT_NS, "name") != Some(NAME_PARAMETER)
            || compact(&param.text) != wanted
        {
            continue;
        }
        let Some(parent) = param.parent else { continue };
        if doc.element(parent).is(CONTENT_NS, "structured-macro") && !macros.contains(&parent) {
            macros.push(parent);
        }
    }

    if macros.is_empty() {
        return None;
    }

    let slots = macros
        .into_iter()
        .filter_map(|id| text_slot(doc, id))
        .collect::<Vec<_>>();
    if slots.is_empty() {
        return None;
    }

    Some(MarkedRegion {
        field_name: field_name.to_string(),
        revision: doc.revision(),
        slots,
        created: false,
    })
}

fn text_slot(doc: &PageDocument, macro_id: ElementId) -> Option<TextSlot> {
    let macro_el = doc.element(macro_id);
    let body_id = macro_el
        .children
        .iter()
        .copied()
        .find(|&c| doc.element(c).is(CONTENT_NS, "rich-text-body"));

    let Some(body_id) = body_id else {
        // The name parameter is a child, so the macro has a content span.
        let at = macro_el.content()?.end;
        return Some(TextSlot::MissingBody {
            at,
            prefix: macro_el.prefix().map(String::from),
        });
    };

    let body = doc.element(body_id);
    let Some(body_content) = body.content() else {
        return Some(TextSlot::EmptyBody {
            tag: body.start_tag.clone(),
            qname: body.qname.clone(),
        });
    };

    let paragraph = body
        .children
        .iter()
        .map(|&c| doc.element(c))
        .find(|c| c.is_xhtml("p"));

    Some(match paragraph {
        Some(p) => match p.content() {
            Some(content) => TextSlot::Paragraph { content },
            None => TextSlot::EmptyParagraph {
                tag: p.start_tag.clone(),
                qname: p.qname.clone(),
            },
        },
        None => TextSlot::MissingParagraph {
            at: body_content.start,
        },
    })
}

/// Find the region for `field_name`, synthesizing it if absent.
///
/// A new region gets a fresh macro id, holds `initial_value`, and is inserted
/// as a child of the root right before the root's last element child (or as
/// the only content of an empty root).
pub fn locate_or_create_region(
    doc: &mut PageDocument,
    field_name: &str,
    initial_value: &str,
) -> Result<MarkedRegion> {
    if let Some(region) = locate_region(doc, field_name) {
        return Ok(region);
    }
    if compact(field_name).is_empty() {
        return Err(NetWikiError::validation("region name must not be blank"));
    }

    let prefix = doc
        .root_prefix_for(CONTENT_NS, "ac")
        .ok_or_else(|| {
            NetWikiError::synthesis(format!(
                "no prefix bound to {CONTENT_NS} on the root element"
            ))
        })?
        .to_string();

    let at = insertion_point(doc)?;
    let markup = region_markup(&prefix, Uuid::new_v4(), field_name, initial_value);
    debug!(field = field_name, at, "creating marked region");
    doc.splice(vec![(at..at, markup)])?;

    let mut region = locate_region(doc, field_name).ok_or_else(|| {
        NetWikiError::synthesis(format!("region `{field_name}` not found after insertion"))
    })?;
    region.created = true;
    Ok(region)
}

fn insertion_point(doc: &PageDocument) -> Result<usize> {
    let root = doc.root_element();
    let content = root.content().ok_or_else(|| {
        NetWikiError::synthesis(format!(
            "root element <{}> is self-closing; no insertion point",
            root.qname
        ))
    })?;

    Ok(match root.children.last() {
        Some(&last) => doc.element(last).start_tag.start,
        None => content.end,
    })
}

fn region_markup(prefix: &str, macro_id: Uuid, field_name: &str, value: &str) -> String {
    let name = partial_escape(field_name);
    let value = partial_escape(value);
    format!(
        concat!(
            r#"<{p}:structured-macro {p}:name="{macro_name}" {p}:schema-version="1" {p}:macro-id="{id}">"#,
            r#"<{p}:parameter {p}:name="{name_param}">{name}</{p}:parameter>"#,
            r#"<{p}:parameter {p}:name="{output_param}">{output}</{p}:parameter>"#,
            r#"<{p}:rich-text-body><p>{value}</p></{p}:rich-text-body>"#,
            r#"</{p}:structured-macro>"#,
        ),
        p = prefix,
        macro_name = MACRO_NAME,
        id = macro_id,
        name_param = NAME_PARAMETER,
        name = name,
        output_param = OUTPUT_TYPE_PARAMETER,
        output = OUTPUT_TYPE,
        value = value,
    )
}

/// Write `text` into every matched macro of `region`.
///
/// `region` must have been located at the document's current revision.
pub fn set_region_value(doc: &mut PageDocument, region: &MarkedRegion, text: &str) -> Result<()> {
    if region.revision != doc.revision() {
        return Err(NetWikiError::synthesis(format!(
            "region `{}` is stale (located at revision {}, document is at {})",
            region.field_name,
            region.revision,
            doc.revision()
        )));
    }

    let escaped = partial_escape(text);
    let edits = region
        .slots
        .iter()
        .map(|slot| slot.edit(doc.source(), &escaped))
        .collect();
    doc.splice(edits)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Convenience
// ---------------------------------------------------------------------------

/// What [`patch_field`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchOutcome {
    /// A new region was synthesized.
    pub created: bool,
    /// Number of macros holding the field.
    pub matches: usize,
    /// The document text changed.
    pub changed: bool,
}

/// Locate or create the region for `field_name` and set its value.
pub fn patch_field(doc: &mut PageDocument, field_name: &str, value: &str) -> Result<PatchOutcome> {
    let before = doc.revision();
    let region = locate_or_create_region(doc, field_name, value)?;
    set_region_value(doc, &region, value)?;

    Ok(PatchOutcome {
        created: region.is_created(),
        matches: region.matches(),
        changed: doc.revision() != before,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn excerpt(name: &str, value: &str) -> String {
        format!(
            r#"<ac:structured-macro ac:name="multiexcerpt" ac:macro-id="fixed"><ac:parameter ac:name="MultiExcerptName">{name}</ac:parameter><ac:rich-text-body><p>{value}</p></ac:rich-text-body></ac:structured-macro>"#
        )
    }

    fn values(doc: &PageDocument, name: &str) -> Vec<String> {
        let Some(region) = locate_region(doc, name) else {
            return Vec::new();
        };
        region
            .slots
            .iter()
            .map(|slot| match slot {
                TextSlot::Paragraph { content } => doc.source()[content.clone()].to_string(),
                other => panic!("unexpected slot {other:?}"),
            })
            .collect()
    }

    #[test]
    fn creates_region_when_absent() {
        let mut doc = PageDocument::from_storage_body("<p>head</p><p>foot</p>").unwrap();
        let outcome = patch_field(&mut doc, "status", "Active").unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.matches, 1);
        assert_eq!(values(&doc, "status"), vec!["Active"]);

        let body = doc.to_storage_body();
        assert!(body.starts_with("<p>head</p><ac:structured-macro ac:name=\"multiexcerpt\""));
        assert!(body.ends_with("</ac:structured-macro><p>foot</p>"));
        assert!(body.contains(r#"<ac:parameter ac:name="atlassian-macro-output-type">BLOCK</ac:parameter>"#));
        assert_eq!(body.matches("ac:macro-id=").count(), 1);
    }

    #[test]
    fn empty_root_gets_region_as_only_child() {
        let mut doc = PageDocument::from_storage_body("").unwrap();
        patch_field(&mut doc, "description", "Office 1").unwrap();
        let body = doc.to_storage_body();
        assert!(body.starts_with("<ac:structured-macro"));
        assert!(body.ends_with("</ac:structured-macro>"));
        assert_eq!(values(&doc, "description"), vec!["Office 1"]);
    }

    #[test]
    fn text_only_root_appends_after_text() {
        let mut doc = PageDocument::from_storage_body("plain words").unwrap();
        patch_field(&mut doc, "x", "1").unwrap();
        assert!(doc.to_storage_body().starts_with("plain words<ac:structured-macro"));
    }

    #[test]
    fn updates_existing_region_in_place() {
        let body = format!("<p>a</p>{}<p>b</p>", excerpt("status", "old"));
        let mut doc = PageDocument::from_storage_body(&body).unwrap();
        let outcome = patch_field(&mut doc, "status", "new").unwrap();
        assert!(!outcome.created);
        assert!(outcome.changed);
        assert_eq!(doc.to_storage_body(), body.replace(">old<", ">new<"));
    }

    #[test]
    fn reapplying_is_idempotent() {
        let mut doc = PageDocument::from_storage_body("<p>a</p><p>b</p>").unwrap();
        patch_field(&mut doc, "status", "Active").unwrap();
        let first = doc.to_storage_body();

        let outcome = patch_field(&mut doc, "status", "Active").unwrap();
        assert!(!outcome.created);
        assert!(!outcome.changed);
        assert_eq!(doc.to_storage_body(), first);
        assert_eq!(first.matches("MultiExcerptName").count(), 1);
    }

    #[test]
    fn patching_one_field_leaves_others_untouched() {
        let other = excerpt("description", "Office&nbsp;1 <b>bold</b>");
        let body = format!(
            "<h1 class=\"x\">Title</h1>{other}<!-- note -->{}<p />",
            excerpt("status", "old")
        );
        let mut doc = PageDocument::from_storage_body(&body).unwrap();
        patch_field(&mut doc, "status", "new").unwrap();

        let patched = doc.to_storage_body();
        let expected = format!(
            "<h1 class=\"x\">Title</h1>{other}<!-- note -->{}<p />",
            excerpt("status", "new")
        );
        assert_eq!(patched, expected);
    }

    #[test]
    fn name_match_ignores_whitespace_but_not_case() {
        let body = excerpt("  custom_ purpose\n", "old");
        let mut doc = PageDocument::from_storage_body(&body).unwrap();
        assert!(locate_region(&doc, "custom_purpose").is_some());
        assert!(locate_region(&doc, "Custom_Purpose").is_none());

        let outcome = patch_field(&mut doc, "custom_purpose", "Lab").unwrap();
        assert!(!outcome.created);
        assert_eq!(values(&doc, "custom_purpose"), vec!["Lab"]);
    }

    #[test]
    fn hand_edited_nbsp_in_name_still_matches() {
        let body = format!("<p>a</p>{}", excerpt("status&nbsp;", "old"));
        let mut doc = PageDocument::from_storage_body(&body).unwrap();

        let outcome = patch_field(&mut doc, "status", "new").unwrap();
        assert!(!outcome.created);
        assert_eq!(outcome.matches, 1);

        let patched = doc.to_storage_body();
        assert_eq!(patched.matches("MultiExcerptName").count(), 1);
        assert_eq!(patched, body.replace(">old<", ">new<"));
    }

    #[test]
    fn locate_has_no_side_effects() {
        let body = excerpt("status", "old");
        let doc = PageDocument::from_storage_body(&body).unwrap();
        let before = doc.as_xml().to_string();
        let _ = locate_region(&doc, "status");
        let _ = locate_region(&doc, "missing");
        assert_eq!(doc.as_xml(), before);
        assert_eq!(doc.revision(), 0);
    }

    #[test]
    fn duplicates_are_all_updated() {
        let body = format!("{}<p>mid</p>{}", excerpt("status", "a"), excerpt("status", "b"));
        let mut doc = PageDocument::from_storage_body(&body).unwrap();
        let outcome = patch_field(&mut doc, "status", "c").unwrap();
        assert_eq!(outcome.matches, 2);
        assert_eq!(values(&doc, "status"), vec!["c", "c"]);
        assert!(doc.to_storage_body().contains("<p>mid</p>"));
    }

    #[test]
    fn values_are_escaped() {
        let mut doc = PageDocument::from_storage_body("").unwrap();
        patch_field(&mut doc, "notes", "a < b & c").unwrap();
        assert!(doc.to_storage_body().contains("<p>a &lt; b &amp; c</p>"));
        // Still parses and still matches after escaping.
        let reparsed = PageDocument::from_storage_body(&doc.to_storage_body()).unwrap();
        assert!(locate_region(&reparsed, "notes").is_some());
    }

    #[test]
    fn paragraph_attributes_survive_rewrite() {
        let body = r#"<ac:structured-macro ac:name="multiexcerpt"><ac:parameter ac:name="MultiExcerptName">status</ac:parameter><ac:rich-text-body><p class="keep">old<br/>x</p><p>second</p></ac:rich-text-body></ac:structured-macro>"#;
        let mut doc = PageDocument::from_storage_body(body).unwrap();
        patch_field(&mut doc, "status", "new").unwrap();
        assert_eq!(
            doc.to_storage_body(),
            body.replace("old<br/>x", "new")
        );
    }

    #[test]
    fn missing_paragraph_and_body_are_filled_in() {
        let no_p = r#"<ac:structured-macro ac:name="multiexcerpt"><ac:parameter ac:name="MultiExcerptName">a</ac:parameter><ac:rich-text-body><table/></ac:rich-text-body></ac:structured-macro>"#;
        let mut doc = PageDocument::from_storage_body(no_p).unwrap();
        let outcome = patch_field(&mut doc, "a", "1").unwrap();
        assert!(!outcome.created);
        assert!(doc.to_storage_body().contains("<ac:rich-text-body><p>1</p><table/>"));

        let no_body = r#"<ac:structured-macro ac:name="multiexcerpt"><ac:parameter ac:name="MultiExcerptName">b</ac:parameter></ac:structured-macro>"#;
        let mut doc = PageDocument::from_storage_body(no_body).unwrap();
        patch_field(&mut doc, "b", "2").unwrap();
        assert!(doc.to_storage_body().ends_with(
            "</ac:parameter><ac:rich-text-body><p>2</p></ac:rich-text-body></ac:structured-macro>"
        ));

        let empty_body = r#"<ac:structured-macro ac:name="multiexcerpt"><ac:parameter ac:name="MultiExcerptName">c</ac:parameter><ac:rich-text-body /></ac:structured-macro>"#;
        let mut doc = PageDocument::from_storage_body(empty_body).unwrap();
        patch_field(&mut doc, "c", "3").unwrap();
        assert!(doc.to_storage_body().contains("<ac:rich-text-body><p>3</p></ac:rich-text-body>"));

        let empty_p = r#"<ac:structured-macro ac:name="multiexcerpt"><ac:parameter ac:name="MultiExcerptName">d</ac:parameter><ac:rich-text-body><p class="k"/></ac:rich-text-body></ac:structured-macro>"#;
        let mut doc = PageDocument::from_storage_body(empty_p).unwrap();
        patch_field(&mut doc, "d", "4").unwrap();
        assert!(doc.to_storage_body().contains(r#"<p class="k">4</p>"#));
        // Subsequent runs see a normal paragraph.
        assert_eq!(values(&doc, "d"), vec!["4"]);
    }

    #[test]
    fn parameter_outside_a_macro_is_ignored() {
        let body = r#"<div><ac:parameter ac:name="MultiExcerptName">status</ac:parameter></div>"#;
        let mut doc = PageDocument::from_storage_body(body).unwrap();
        assert!(locate_region(&doc, "status").is_none());
        let outcome = patch_field(&mut doc, "status", "x").unwrap();
        assert!(outcome.created);
    }

    #[test]
    fn stale_region_is_rejected() {
        let mut doc = PageDocument::from_storage_body(&excerpt("a", "1")).unwrap();
        let region = locate_region(&doc, "a").unwrap();
        set_region_value(&mut doc, &region, "2").unwrap();
        let err = set_region_value(&mut doc, &region, "3").unwrap_err();
        assert!(matches!(err, NetWikiError::RegionSynthesis { .. }));
        assert_eq!(values(&doc, "a"), vec!["2"]);
    }

    #[test]
    fn self_closing_root_has_no_insertion_point() {
        let mut doc =
            PageDocument::from_xml(r#"<root xmlns:ac="http://atlassian.com/content"/>"#).unwrap();
        let err = locate_or_create_region(&mut doc, "status", "x").unwrap_err();
        assert!(matches!(err, NetWikiError::RegionSynthesis { .. }));
    }

    #[test]
    fn unbound_content_namespace_cannot_synthesize() {
        let mut doc = PageDocument::from_xml("<root><p/></root>").unwrap();
        let err = locate_or_create_region(&mut doc, "status", "x").unwrap_err();
        assert!(matches!(err, NetWikiError::RegionSynthesis { .. }));
        assert_eq!(doc.as_xml(), "<root><p/></root>");
    }

    #[test]
    fn created_region_uses_a_fresh_macro_id() {
        let mut doc = PageDocument::from_storage_body("").unwrap();
        patch_field(&mut doc, "a", "1").unwrap();
        patch_field(&mut doc, "b", "2").unwrap();
        let body = doc.to_storage_body();
        let ids: Vec<&str> = body
            .split("ac:macro-id=\"")
            .skip(1)
            .map(|rest| &rest[..36])
            .collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert!(ids.iter().all(|id| Uuid::parse_str(id).is_ok()));
    }

    #[test]
    fn blank_name_is_rejected() {
        let mut doc = PageDocument::from_storage_body("").unwrap();
        assert!(locate_or_create_region(&mut doc, "  ", "x").is_err());
    }
}

//! Span-preserving page document model.
//!
//! A [`PageDocument`] keeps the page body exactly as fetched and derives an
//! element index from it (names, resolved namespaces, attributes, and the byte
//! spans of every start tag, content, and end tag). Edits are byte-range
//! splices followed by a re-index, so markup that is not edited is never
//! re-serialized.

use std::ops::Range;

use quick_xml::Reader;
use quick_xml::escape::{resolve_html5_entity, resolve_predefined_entity, unescape_with};
use quick_xml::events::{BytesStart, Event};

use netwiki_shared::{NetWikiError, Result};

/// Confluence content namespace (`ac:` / `atlassian-content:`).
pub const CONTENT_NS: &str = "http://atlassian.com/content";

/// XHTML namespace, the default namespace of storage-format bodies.
pub const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

/// Synthetic root wrapped around storage-format fragments.
const ROOT_TAG: &str = "netwiki-root";

/// Namespace declarations placed on the synthetic root.
const ROOT_NAMESPACES: &str = concat!(
    r#" xmlns="http://www.w3.org/1999/xhtml""#,
    r#" xmlns:ac="http://atlassian.com/content""#,
    r#" xmlns:atlassian-content="http://atlassian.com/content""#,
    r#" xmlns:ri="http://atlassian.com/resource/identifier""#,
    r#" xmlns:at="http://atlassian.com/template""#,
    r#" xmlns:atlassian-template="http://atlassian.com/template""#,
);

// ---------------------------------------------------------------------------
// Index types
// ---------------------------------------------------------------------------

/// Identifier of an element within one revision of a document.
pub(crate) type ElementId = usize;

/// An attribute with its prefix resolved.
#[derive(Debug, Clone)]
pub(crate) struct Attribute {
    pub namespace: Option<String>,
    pub local: String,
    pub value: String,
}

/// One element of the index.
#[derive(Debug, Clone)]
pub(crate) struct Element {
    /// Qualified name as written in the source.
    pub qname: String,
    /// Local part of the name.
    pub local: String,
    /// Resolved namespace URI, if the prefix (or default namespace) is bound.
    pub namespace: Option<String>,
    pub attributes: Vec<Attribute>,
    /// Direct text content (text and CDATA between child elements).
    pub text: String,
    pub start_tag: Range<usize>,
    /// `None` for self-closing elements.
    pub end_tag: Option<Range<usize>>,
    pub parent: Option<ElementId>,
    pub children: Vec<ElementId>,
}

impl Element {
    /// Byte span between the start and end tag.
    pub fn content(&self) -> Option<Range<usize>> {
        self.end_tag
            .as_ref()
            .map(|end| self.start_tag.end..end.start)
    }

    /// Prefix of the qualified name, if any.
    pub fn prefix(&self) -> Option<&str> {
        self.qname.split_once(':').map(|(prefix, _)| prefix)
    }

    pub fn is(&self, namespace: &str, local: &str) -> bool {
        self.local == local && self.namespace.as_deref() == Some(namespace)
    }

    /// XHTML element by local name; unqualified documents without a default
    /// namespace match too.
    pub fn is_xhtml(&self, local: &str) -> bool {
        self.local == local && self.namespace.as_deref().is_none_or(|ns| ns == XHTML_NS)
    }

    pub fn attribute(&self, namespace: &str, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.local == local && a.namespace.as_deref() == Some(namespace))
            .map(|a| a.value.as_str())
    }
}

// ---------------------------------------------------------------------------
// PageDocument
// ---------------------------------------------------------------------------

/// Exclusively owned, mutable representation of one page body.
#[derive(Debug, Clone)]
pub struct PageDocument {
    source: String,
    elements: Vec<Element>,
    root: ElementId,
    /// Namespace bindings in scope on the root element (prefix, URI).
    root_scope: Vec<(String, String)>,
    wrapped: bool,
    revision: u64,
}

impl PageDocument {
    /// Parse a Confluence storage-format fragment.
    ///
    /// The fragment is wrapped in a synthetic root declaring the Confluence
    /// namespaces; [`to_storage_body`](Self::to_storage_body) strips it again.
    pub fn from_storage_body(body: &str) -> Result<Self> {
        let source = format!("<{ROOT_TAG}{ROOT_NAMESPACES}>{body}</{ROOT_TAG}>");
        let mut doc = Self::from_xml(&source)?;
        doc.wrapped = true;
        Ok(doc)
    }

    /// Parse a complete document with exactly one root element.
    pub fn from_xml(source: &str) -> Result<Self> {
        let index = build_index(source)?;
        Ok(Self {
            source: source.to_string(),
            elements: index.elements,
            root: index.root,
            root_scope: index.root_scope,
            wrapped: false,
            revision: 0,
        })
    }

    /// Serialize the body for the wiki: the root's content, wrapper stripped.
    ///
    /// For documents parsed with [`from_xml`](Self::from_xml) this is the
    /// root's inner markup as well.
    pub fn to_storage_body(&self) -> String {
        match self.root_element().content() {
            Some(range) => self.source[range].to_string(),
            None => String::new(),
        }
    }

    /// The full document text, including the synthetic root if present.
    pub fn as_xml(&self) -> &str {
        &self.source
    }

    /// Whether the document was parsed from a storage-format fragment.
    pub fn is_wrapped(&self) -> bool {
        self.wrapped
    }

    /// Counter bumped by every mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    // -- crate-internal accessors ------------------------------------------

    pub(crate) fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub(crate) fn element(&self, id: ElementId) -> &Element {
        &self.elements[id]
    }

    pub(crate) fn root_element(&self) -> &Element {
        &self.elements[self.root]
    }

    /// Prefix bound to `namespace` on the root, preferring `preferred`.
    pub(crate) fn root_prefix_for(&self, namespace: &str, preferred: &str) -> Option<&str> {
        let mut bound = self
            .root_scope
            .iter()
            .filter(|(prefix, uri)| uri == namespace && !prefix.is_empty());
        let first = bound.clone().next().map(|(prefix, _)| prefix.as_str());
        bound
            .find(|(prefix, _)| prefix == preferred)
            .map(|(prefix, _)| prefix.as_str())
            .or(first)
    }

    /// Apply non-overlapping replacements and re-index.
    ///
    /// The edit is all-or-nothing: if the result does not re-index, the
    /// document is left untouched. Returns `false` when nothing changed.
    pub(crate) fn splice(&mut self, mut edits: Vec<(Range<usize>, String)>) -> Result<bool> {
        edits.retain(|(range, text)| self.source[range.clone()] != *text);
        if edits.is_empty() {
            return Ok(false);
        }

        edits.sort_by(|a, b| b.0.start.cmp(&a.0.start));
        for pair in edits.windows(2) {
            if pair[1].0.end > pair[0].0.start {
                return Err(NetWikiError::synthesis("overlapping edits in one splice"));
            }
        }

        let mut next = self.source.clone();
        for (range, text) in &edits {
            next.replace_range(range.clone(), text);
        }

        let index = build_index(&next).map_err(|e| {
            NetWikiError::synthesis(format!("edit produced an unparseable document: {e}"))
        })?;

        self.source = next;
        self.elements = index.elements;
        self.root = index.root;
        self.root_scope = index.root_scope;
        self.revision += 1;
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Indexing
// ---------------------------------------------------------------------------

struct Index {
    elements: Vec<Element>,
    root: ElementId,
    root_scope: Vec<(String, String)>,
}

/// Namespace bindings declared on one open element.
type Scope = Vec<(String, String)>;

fn build_index(source: &str) -> Result<Index> {
    let mut reader = Reader::from_str(source);
    let mut elements: Vec<Element> = Vec::new();
    let mut stack: Vec<ElementId> = Vec::new();
    let mut scopes: Vec<Scope> = Vec::new();
    let mut root: Option<ElementId> = None;
    let mut root_scope: Vec<(String, String)> = Vec::new();

    loop {
        let start = reader.buffer_position() as usize;
        let event = reader.read_event().map_err(|e| {
            NetWikiError::parse(format!("at byte {}: {e}", reader.error_position()))
        })?;
        let end = reader.buffer_position() as usize;

        match event {
            Event::Start(ref tag) | Event::Empty(ref tag) => {
                let self_closing = matches!(event, Event::Empty(_));
                if stack.is_empty() && root.is_some() {
                    return Err(NetWikiError::parse(format!(
                        "at byte {start}: more than one root element"
                    )));
                }

                scopes.push(declarations(tag)?);
                let mut element = open_element(tag, &scopes)?;
                element.start_tag = start..end;
                element.parent = stack.last().copied();

                let id = elements.len();
                if let Some(&parent) = stack.last() {
                    elements[parent].children.push(id);
                }
                if root.is_none() {
                    root = Some(id);
                    root_scope = flatten(&scopes);
                }
                elements.push(element);

                if self_closing {
                    scopes.pop();
                } else {
                    stack.push(id);
                }
            }
            Event::End(_) => {
                let id = stack.pop().ok_or_else(|| {
                    NetWikiError::parse(format!("at byte {start}: unexpected closing tag"))
                })?;
                scopes.pop();
                elements[id].end_tag = Some(start..end);
            }
            Event::Text(ref text) => match stack.last() {
                Some(&id) => {
                    let raw = std::str::from_utf8(text)
                        .map_err(|e| NetWikiError::parse(format!("at byte {start}: {e}")))?;
                    // HTML entities such as `&nbsp;` decode too; unknown ones stay verbatim.
                    let value = unescape_with(raw, |entity| {
                        resolve_predefined_entity(entity).or_else(|| resolve_html5_entity(entity))
                    })
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| raw.into());
                    elements[id].text.push_str(&value);
                }
                None => {
                    if !text.iter().all(u8::is_ascii_whitespace) {
                        return Err(NetWikiError::parse(format!(
                            "at byte {start}: text outside the root element"
                        )));
                    }
                }
            },
            Event::CData(ref data) => {
                if let Some(&id) = stack.last() {
                    elements[id].text.push_str(&String::from_utf8_lossy(data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(&open) = stack.last() {
        return Err(NetWikiError::parse(format!(
            "unclosed element <{}>",
            elements[open].qname
        )));
    }
    let root = root.ok_or_else(|| NetWikiError::parse("document has no root element"))?;

    Ok(Index {
        elements,
        root,
        root_scope,
    })
}

/// Collect `xmlns` / `xmlns:p` declarations on a tag. The default namespace
/// is stored under the empty prefix.
fn declarations(tag: &BytesStart<'_>) -> Result<Scope> {
    let mut scope = Vec::new();
    for attr in tag.attributes() {
        let attr = attr.map_err(|e| NetWikiError::parse(format!("bad attribute: {e}")))?;
        let key = utf8(attr.key.as_ref())?;
        let prefix = match key.strip_prefix("xmlns") {
            Some("") => "",
            Some(rest) => match rest.strip_prefix(':') {
                Some(prefix) => prefix,
                None => continue,
            },
            None => continue,
        };
        scope.push((prefix.to_string(), utf8(&attr.value)?.to_string()));
    }
    Ok(scope)
}

fn open_element(tag: &BytesStart<'_>, scopes: &[Scope]) -> Result<Element> {
    let qname = utf8(tag.name().as_ref())?.to_string();
    let (prefix, local) = split_qname(&qname);
    let namespace = resolve(scopes, prefix.unwrap_or(""));

    let mut attributes = Vec::new();
    for attr in tag.attributes() {
        let attr = attr.map_err(|e| NetWikiError::parse(format!("bad attribute: {e}")))?;
        let key = utf8(attr.key.as_ref())?;
        if key == "xmlns" || key.starts_with("xmlns:") {
            continue;
        }
        let (attr_prefix, attr_local) = split_qname(key);
        // Unprefixed attributes are in no namespace.
        let attr_namespace = attr_prefix.and_then(|p| resolve(scopes, p));
        let value = match attr.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        attributes.push(Attribute {
            namespace: attr_namespace,
            local: attr_local.to_string(),
            value,
        });
    }

    Ok(Element {
        local: local.to_string(),
        qname,
        namespace,
        attributes,
        text: String::new(),
        start_tag: 0..0,
        end_tag: None,
        parent: None,
        children: Vec::new(),
    })
}

fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    }
}

fn resolve(scopes: &[Scope], prefix: &str) -> Option<String> {
    scopes
        .iter()
        .rev()
        .flat_map(|scope| scope.iter())
        .find(|(p, _)| p == prefix)
        .map(|(_, uri)| uri.clone())
        .filter(|uri| !uri.is_empty())
}

/// All bindings visible at the innermost scope, innermost first.
fn flatten(scopes: &[Scope]) -> Vec<(String, String)> {
    scopes.iter().rev().flat_map(|s| s.iter().cloned()).collect()
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| NetWikiError::parse(format!("invalid UTF-8: {e}")))
}

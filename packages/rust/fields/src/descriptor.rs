//! Field descriptors: named, typed extraction rules over payload values.

use serde_json::Value;

use netwiki_shared::{CUSTOM_FIELD_PREFIX, FieldKind, NetWikiError, Result};

/// One logical field to synchronize, bound to its value for one update.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    display_name: String,
    source_name: String,
    custom: bool,
    raw: Value,
    kind: FieldKind,
}

impl FieldDescriptor {
    pub fn new(source_name: impl Into<String>, raw: Value, kind: FieldKind, custom: bool) -> Self {
        let source_name = source_name.into();
        let display_name = if custom {
            format!("{CUSTOM_FIELD_PREFIX}{source_name}")
        } else {
            source_name.clone()
        };
        Self {
            display_name,
            source_name,
            custom,
            raw,
            kind,
        }
    }

    /// Region name on the wiki page (`custom_`-prefixed for custom fields).
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Field name as it appears in the payload.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn is_custom(&self) -> bool {
        self.custom
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Produce the text shown on the wiki page.
    ///
    /// Fails with `MalformedValue` on a shape mismatch or when the text holds
    /// a character XML 1.0 cannot carry.
    pub fn extract_value(&self) -> Result<String> {
        let text = self.project()?;
        match text.char_indices().find(|&(_, c)| !is_xml_char(c)) {
            Some((at, c)) => Err(self.malformed(format!(
                "character U+{:04X} at byte {at} is not allowed in page content",
                c as u32
            ))),
            None => Ok(text),
        }
    }

    fn project(&self) -> Result<String> {
        match self.kind {
            FieldKind::PlainText => match &self.raw {
                Value::String(s) => Ok(s.clone()),
                other => Err(self.malformed(format!("expected a string, got {other}"))),
            },
            FieldKind::LabelProjection => {
                let Value::Object(map) = &self.raw else {
                    return Err(self.malformed(format!(
                        "expected an object with a `label`, got {}",
                        self.raw
                    )));
                };
                match map.get("label") {
                    Some(Value::String(label)) => Ok(label.clone()),
                    Some(other) => Err(self.malformed(format!("`label` is not a string: {other}"))),
                    None => Err(self.malformed("object has no `label` key")),
                }
            }
            FieldKind::Scalar => match &self.raw {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                Value::Bool(b) => Ok(b.to_string()),
                Value::Null => Ok(String::new()),
                other => Err(self.malformed(format!("expected a scalar, got {other}"))),
            },
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> NetWikiError {
        NetWikiError::malformed(&self.display_name, reason)
    }
}

/// XML 1.0 `Char` production.
fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..)
}

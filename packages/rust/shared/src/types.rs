//! Core domain types: the inbound webhook payload and field mappings.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{NetWikiError, Result};

/// Prefix applied to the display name of fields read from `custom_fields`.
pub const CUSTOM_FIELD_PREFIX: &str = "custom_";

// ---------------------------------------------------------------------------
// WebhookPayload
// ---------------------------------------------------------------------------

/// A validated NetBox change-notification payload.
///
/// Only `model`, `data` and `data.custom_fields` are required; the remaining
/// envelope keys are kept when present so they can be logged.
#[derive(Debug, Clone)]
pub struct WebhookPayload {
    /// Entity kind that changed (NetBox model name, e.g. `site`).
    pub model: String,
    /// Built-in field values, without the `custom_fields` entry.
    pub data: Map<String, Value>,
    /// Custom field values.
    pub custom_fields: Map<String, Value>,
    /// NetBox event name (`created`, `updated`, ...).
    pub event: Option<String>,
    /// NetBox request id, for correlating logs.
    pub request_id: Option<String>,
}

impl WebhookPayload {
    /// Parse and validate a raw request body.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| NetWikiError::validation(format!("body is not valid JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Validate an already-parsed JSON document.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut root) = value else {
            return Err(NetWikiError::validation("payload must be a JSON object"));
        };

        let model = match root.remove("model") {
            Some(Value::String(model)) => model,
            Some(other) => {
                return Err(NetWikiError::validation(format!(
                    "`model` should be a string, got {}",
                    json_type(&other)
                )));
            }
            None => return Err(NetWikiError::validation("no `model` in webhook payload")),
        };
        validate_entity_kind(&model)?;

        let mut data = match root.remove("data") {
            Some(Value::Object(data)) => data,
            Some(other) => {
                return Err(NetWikiError::validation(format!(
                    "`data` should be an object, got {}",
                    json_type(&other)
                )));
            }
            None => return Err(NetWikiError::validation("no `data` in webhook payload")),
        };

        let custom_fields = match data.remove("custom_fields") {
            Some(Value::Object(custom)) => custom,
            Some(other) => {
                return Err(NetWikiError::validation(format!(
                    "`custom_fields` should be an object, got {}",
                    json_type(&other)
                )));
            }
            None => {
                return Err(NetWikiError::validation(
                    "no `custom_fields` in webhook payload data",
                ));
            }
        };

        let event = root.get("event").and_then(Value::as_str).map(String::from);
        let request_id = root
            .get("request_id")
            .and_then(Value::as_str)
            .map(String::from);

        Ok(Self {
            model,
            data,
            custom_fields,
            event,
            request_id,
        })
    }

    /// Look up a built-in field value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    /// Look up a custom field value.
    pub fn custom_field(&self, name: &str) -> Option<&Value> {
        self.custom_fields.get(name)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Check that an entity kind is usable in a page title.
pub fn validate_entity_kind(kind: &str) -> Result<()> {
    static KIND_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("valid regex"));

    if KIND_RE.is_match(kind) {
        Ok(())
    } else {
        Err(NetWikiError::validation(format!(
            "invalid model name {kind:?}: expected letters, digits, `_`, `.` or `-`"
        )))
    }
}

// ---------------------------------------------------------------------------
// FieldKind
// ---------------------------------------------------------------------------

/// Value-extraction policy for a synchronized field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    /// The raw value must be a string and is used unchanged.
    #[serde(rename = "text")]
    PlainText,
    /// The raw value must be an object; its `label` is used.
    #[serde(rename = "label", alias = "status")]
    LabelProjection,
    /// Strings, numbers and booleans as text; `null` as empty.
    #[serde(rename = "scalar")]
    Scalar,
}

impl FieldKind {
    /// All kinds, in the order they are offered to operators.
    pub const ALL: [FieldKind; 3] = [Self::PlainText, Self::LabelProjection, Self::Scalar];

    /// Stable identifier used in config files, the CLI and the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PlainText => "text",
            Self::LabelProjection => "label",
            Self::Scalar => "scalar",
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FieldKind {
    type Err = NetWikiError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::PlainText),
            "label" | "status" => Ok(Self::LabelProjection),
            "scalar" => Ok(Self::Scalar),
            other => Err(NetWikiError::validation(format!(
                "unknown field kind {other:?} (expected text, label or scalar)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// FieldMapping
// ---------------------------------------------------------------------------

/// One configured field to synchronize for an entity kind.
///
/// Appears as `[[fields]]` in the config file and as a row in the field
/// mapping store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Entity kind (NetBox model name).
    pub model: String,
    /// Field name as sent by NetBox.
    pub field: String,
    /// Extraction policy.
    pub kind: FieldKind,
    /// Whether the field lives under `data.custom_fields`.
    #[serde(default)]
    pub custom: bool,
}

impl FieldMapping {
    /// Name used to look up the field's region on the wiki page.
    pub fn display_name(&self) -> String {
        if self.custom {
            format!("{CUSTOM_FIELD_PREFIX}{}", self.field)
        } else {
            self.field.clone()
        }
    }
}

impl std::fmt::Display for FieldMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} > {} ({})", self.model, self.display_name(), self.kind)
    }
}

//! Error types for NetWiki.
//!
//! Library crates use [`NetWikiError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all NetWiki operations.
#[derive(Debug, thiserror::Error)]
pub enum NetWikiError {
    /// Required settings or credentials are missing or invalid.
    #[error("config error: {message}")]
    Config { message: String },

    /// Malformed inbound payload or identifier.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Webhook shared secret missing on the server or wrong on the client.
    #[error("authorization error: {message}")]
    Authorization { message: String },

    /// A configured field is not present in the webhook payload.
    #[error(
        "field `{field}` is configured for `{model}` but not present in payload {}; check its custom flag",
        lookup_source(.custom)
    )]
    UnknownFieldMapping {
        model: String,
        field: String,
        custom: bool,
    },

    /// A payload value does not have the shape the extraction policy expects.
    #[error("malformed value for field `{field}`: {reason}")]
    MalformedValue { field: String, reason: String },

    /// The page body is not parseable storage-format markup.
    #[error("document parse error: {message}")]
    DocumentParse { message: String },

    /// A marked region could not be created or written.
    #[error("region synthesis error: {message}")]
    RegionSynthesis { message: String },

    /// The wiki service rejected a fetch, create, or push.
    #[error("remote write error: {0}")]
    RemoteWrite(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn lookup_source(custom: &bool) -> &'static str {
    if *custom { "`data.custom_fields`" } else { "`data`" }
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, NetWikiError>;

/// The three outcomes a webhook caller can observe for a failed trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Unauthorized,
    InvalidInput,
    UpdateFailed,
}

impl NetWikiError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an authorization error from any displayable message.
    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization {
            message: msg.into(),
        }
    }

    /// Create a malformed-value error for `field`.
    pub fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a document parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::DocumentParse {
            message: msg.into(),
        }
    }

    /// Create a region synthesis error from any displayable message.
    pub fn synthesis(msg: impl Into<String>) -> Self {
        Self::RegionSynthesis {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Map the error onto the caller-visible outcome.
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::Authorization { .. } => Outcome::Unauthorized,
            Self::Validation { .. } => Outcome::InvalidInput,
            _ => Outcome::UpdateFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = NetWikiError::config("missing password");
        assert_eq!(err.to_string(), "config error: missing password");

        let err = NetWikiError::malformed("status", "expected an object");
        assert!(err.to_string().contains("`status`"));
    }

    #[test]
    fn unknown_field_names_the_lookup_source() {
        let err = NetWikiError::UnknownFieldMapping {
            model: "site".into(),
            field: "purpose".into(),
            custom: true,
        };
        let msg = err.to_string();
        assert!(msg.contains("`purpose`"));
        assert!(msg.contains("custom_fields"));
    }

    #[test]
    fn outcome_classification() {
        assert_eq!(
            NetWikiError::authorization("nope").outcome(),
            Outcome::Unauthorized
        );
        assert_eq!(
            NetWikiError::validation("bad").outcome(),
            Outcome::InvalidInput
        );
        assert_eq!(
            NetWikiError::RemoteWrite("HTTP 500".into()).outcome(),
            Outcome::UpdateFailed
        );
        assert_eq!(NetWikiError::parse("x").outcome(), Outcome::UpdateFailed);
    }
}

//! Webhook outcomes and their HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use netwiki_shared::{NetWikiError, Outcome};

/// JSON body of every trigger response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerReply {
    pub message: String,
    pub error: Option<String>,
}

impl TriggerReply {
    pub fn success() -> Self {
        Self {
            message: "Successfully updated.".into(),
            error: None,
        }
    }
}

/// Ways a trigger request can fail.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The server has no shared secret configured.
    #[error("webhook token not set: {env} is empty or missing")]
    TokenNotSet { env: String },

    /// The client sent no token or the wrong one.
    #[error("wrong or missing authorization token")]
    Unauthorized,

    /// The request body is not a valid trigger payload.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The update ran and failed, or timed out.
    #[error("update failed: {0}")]
    UpdateFailed(String),
}

impl WebhookError {
    /// HTTP status for this error.
    ///
    /// Update failures answer 400 like invalid input; NetBox only
    /// distinguishes success from failure.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::TokenNotSet { .. } | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::InvalidInput(_) | Self::UpdateFailed(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Response body for this error.
    pub fn reply(&self) -> TriggerReply {
        let (message, error) = match self {
            Self::TokenNotSet { env } => ("Webhook token not set.", format!("{env} not set.")),
            Self::Unauthorized => (
                "Unauthorized access.",
                "Wrong authorization token. Check the additional headers of the NetBox webhook."
                    .to_string(),
            ),
            Self::InvalidInput(detail) => ("Invalid input.", detail.clone()),
            Self::UpdateFailed(detail) => ("Update failed.", detail.clone()),
        };
        TriggerReply {
            message: message.into(),
            error: Some(error),
        }
    }
}

impl From<NetWikiError> for WebhookError {
    fn from(err: NetWikiError) -> Self {
        match err.outcome() {
            Outcome::Unauthorized => Self::Unauthorized,
            Outcome::InvalidInput => Self::InvalidInput(err.to_string()),
            Outcome::UpdateFailed => Self::UpdateFailed(err.to_string()),
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.reply())).into_response()
    }
}

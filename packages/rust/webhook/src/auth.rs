//! Shared-secret check on the `Authorization` header.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use subtle::ConstantTimeEq;

use crate::error::WebhookError;

/// Scheme NetBox sends the secret under: `Authorization: Token <secret>`.
const TOKEN_SCHEME: &str = "Token ";

/// Check the request's token against the configured secret.
///
/// `expected` is `None` when the server has no secret; every request is then
/// rejected with [`WebhookError::TokenNotSet`] naming `token_env`.
pub(crate) fn authorize(
    expected: Option<&str>,
    token_env: &str,
    headers: &HeaderMap,
) -> Result<(), WebhookError> {
    let Some(expected) = expected else {
        return Err(WebhookError::TokenNotSet {
            env: token_env.to_string(),
        });
    };

    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(TOKEN_SCHEME))
        .unwrap_or_default();

    if bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) && !expected.is_empty() {
        Ok(())
    } else {
        Err(WebhookError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn accepts_matching_token() {
        assert!(authorize(Some("s3cret"), "T", &headers("Token s3cret")).is_ok());
    }

    #[test]
    fn rejects_wrong_or_missing_token() {
        for value in ["Token wrong", "Token s3cret ", "Bearer s3cret", "s3cret", "Token "] {
            assert!(
                matches!(
                    authorize(Some("s3cret"), "T", &headers(value)),
                    Err(WebhookError::Unauthorized)
                ),
                "{value:?} was accepted"
            );
        }
        assert!(matches!(
            authorize(Some("s3cret"), "T", &HeaderMap::new()),
            Err(WebhookError::Unauthorized)
        ));
    }

    #[test]
    fn missing_server_secret_rejects_everything() {
        let err = authorize(None, "NETWIKI_WEBHOOK_TOKEN", &headers("Token anything")).unwrap_err();
        assert!(matches!(err, WebhookError::TokenNotSet { ref env } if env == "NETWIKI_WEBHOOK_TOKEN"));
    }
}

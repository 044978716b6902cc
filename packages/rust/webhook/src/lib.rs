//! NetBox webhook endpoint.
//!
//! NetBox posts a change notification to [`TRIGGER_PATH`] with the shared
//! secret in `Authorization: Token <secret>`. The handler authenticates,
//! validates the payload, runs one update under a timeout and answers:
//!
//! | Outcome | Status | `message` |
//! |---|---|---|
//! | success | 201 | `Successfully updated.` |
//! | no server secret | 401 | `Webhook token not set.` |
//! | wrong/missing token | 401 | `Unauthorized access.` |
//! | bad payload | 400 | `Invalid input.` |
//! | update error or timeout | 400 | `Update failed.` |

mod auth;
mod error;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tracing::{info, instrument, warn};

use netwiki_confluence::PageStore;
use netwiki_core::UpdateOrchestrator;
use netwiki_shared::{WebhookPayload, WebhookSettings};

pub use error::{TriggerReply, WebhookError};

/// Route NetBox webhooks are configured to call.
pub const TRIGGER_PATH: &str = "/model_change_trigger/";

/// Shared handler state.
pub struct WebhookState<S> {
    orchestrator: Arc<UpdateOrchestrator<S>>,
    token: Option<String>,
    token_env: String,
    update_timeout: Duration,
}

impl<S> WebhookState<S> {
    pub fn new(orchestrator: Arc<UpdateOrchestrator<S>>, settings: &WebhookSettings) -> Self {
        Self {
            orchestrator,
            token: settings.token.clone(),
            token_env: settings.token_env.clone(),
            update_timeout: settings.update_timeout,
        }
    }
}

/// Build the router serving [`TRIGGER_PATH`].
pub fn router<S: PageStore + 'static>(state: WebhookState<S>) -> Router {
    Router::new()
        .route(TRIGGER_PATH, post(trigger::<S>))
        .with_state(Arc::new(state))
}

/// Serve `router` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, path = TRIGGER_PATH, "webhook server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

#[instrument(skip_all)]
async fn trigger<S: PageStore + 'static>(
    State(state): State<Arc<WebhookState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<TriggerReply>), WebhookError> {
    let start = Instant::now();

    auth::authorize(state.token.as_deref(), &state.token_env, &headers)
        .inspect_err(|e| warn!(error = %e, "trigger rejected"))?;

    let payload = WebhookPayload::from_slice(&body).map_err(|e| {
        warn!(error = %e, "invalid trigger payload");
        WebhookError::from(e)
    })?;

    let update = state.orchestrator.apply_update(&payload);
    let report = match tokio::time::timeout(state.update_timeout, update).await {
        Ok(Ok(report)) => report,
        Ok(Err(e)) => {
            warn!(model = %payload.model, error = %e, "update failed");
            return Err(e.into());
        }
        Err(_) => {
            warn!(model = %payload.model, timeout = ?state.update_timeout, "update timed out");
            return Err(WebhookError::UpdateFailed(format!(
                "update timed out after {:?}",
                state.update_timeout
            )));
        }
    };

    info!(
        model = %payload.model,
        event = payload.event.as_deref().unwrap_or("-"),
        page = %report.page_title,
        pushed = report.pushed,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "trigger handled"
    );
    Ok((StatusCode::CREATED, Json(TriggerReply::success())))
}

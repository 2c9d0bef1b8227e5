//! HTTP routes for Telegram webhook delivery.
//!
//! The handler only decodes and enqueues; triage runs on the bot's own tasks,
//! so Telegram always gets its `OK` straight away. Rejected button presses
//! are acknowledged on a detached task for the same reason.

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::{get, post};
use tokio::sync::mpsc;

use crate::channels::IncomingMessage;
use crate::channels::telegram::{ParsedUpdate, TelegramApi, parse_update};

/// Body of the liveness route.
pub const HEALTH_TEXT: &str = "🤖 Bot en línea";

#[derive(Clone)]
struct WebhookState {
    api: TelegramApi,
    tx: mpsc::UnboundedSender<IncomingMessage>,
}

/// Build the webhook router: `GET /` and `POST /webhook/{token}`.
pub fn webhook_routes(api: TelegramApi, tx: mpsc::UnboundedSender<IncomingMessage>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/webhook/{token}", post(receive_update))
        .with_state(WebhookState { api, tx })
}

async fn health() -> &'static str {
    HEALTH_TEXT
}

async fn receive_update(
    State(state): State<WebhookState>,
    Path(token): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    if !state.api.token_matches(&token) {
        return (StatusCode::NOT_FOUND, "Not Found");
    }

    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    if !is_json {
        return (StatusCode::BAD_REQUEST, "Bad Request");
    }

    let update: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            tracing::warn!("Rejected malformed webhook payload: {e}");
            return (StatusCode::BAD_REQUEST, "Bad Request");
        }
    };

    match parse_update(&update) {
        Some(ParsedUpdate::Message(msg)) => {
            if state.tx.send(msg).is_err() {
                tracing::warn!("Webhook update dropped: bot is no longer listening");
            }
        }
        Some(ParsedUpdate::RejectedCallback { callback_id }) => {
            let api = state.api.clone();
            tokio::spawn(async move { api.dismiss_callback(&callback_id).await });
        }
        None => {}
    }

    (StatusCode::OK, "OK")
}

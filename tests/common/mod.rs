//! In-process stand-ins for the Telegram Bot API and Gemini.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};

pub const BOT_TOKEN: &str = "123:ABC";

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

// ── Telegram ────────────────────────────────────────────────────────

/// Records every Bot API call and replays queued updates once.
#[derive(Default)]
pub struct TelegramStub {
    calls: Mutex<Vec<(String, Value)>>,
    pending_updates: Mutex<Vec<Value>>,
    /// Refuse any call that sets `parse_mode`.
    pub reject_markdown: bool,
}

impl TelegramStub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rejecting_markdown() -> Arc<Self> {
        Arc::new(Self {
            reject_markdown: true,
            ..Self::default()
        })
    }

    pub fn queue_update(&self, update: Value) {
        self.pending_updates.lock().unwrap().push(update);
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, method: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter(|(m, _)| m == method)
            .map(|(_, body)| body)
            .collect()
    }

    /// Start serving; returns the base URL to hand to `with_api_base`.
    pub async fn start(self: &Arc<Self>) -> String {
        let app = Router::new()
            .route("/{bot}/{method}", post(telegram_method))
            .with_state(Arc::clone(self));
        format!("http://{}", serve(app).await)
    }
}

async fn telegram_method(
    State(stub): State<Arc<TelegramStub>>,
    Path((bot, method)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if bot != format!("bot{BOT_TOKEN}") {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"ok": false, "description": "Unauthorized"})),
        );
    }

    stub.calls
        .lock()
        .unwrap()
        .push((method.clone(), body.clone()));

    if stub.reject_markdown && body.get("parse_mode").is_some() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"ok": false, "description": "Bad Request: can't parse entities"})),
        );
    }

    let result = match method.as_str() {
        "getUpdates" => {
            let updates = std::mem::take(&mut *stub.pending_updates.lock().unwrap());
            if updates.is_empty() {
                // Behave like a long poll so the poller doesn't spin.
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
            Value::Array(updates)
        }
        "getMe" => json!({"id": 1, "is_bot": true, "username": "HelpdeskBot"}),
        "sendMessage" => json!({"message_id": 500, "chat": {"id": body["chat_id"]}}),
        _ => Value::Bool(true),
    };
    (StatusCode::OK, Json(json!({"ok": true, "result": result})))
}

// ── Gemini ──────────────────────────────────────────────────────────

/// Answers every `generateContent` call with a fixed status and body.
pub struct GeminiStub {
    status: StatusCode,
    body: Value,
    requests: Mutex<Vec<(Option<String>, Value)>>,
}

impl GeminiStub {
    pub fn replying(text: &str) -> Arc<Self> {
        Self::with_response(
            StatusCode::OK,
            json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": text}]},
                    "finishReason": "STOP"
                }]
            }),
        )
    }

    pub fn with_response(status: StatusCode, body: Value) -> Arc<Self> {
        Arc::new(Self {
            status,
            body,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// (`x-goog-api-key` header, request body) for every call.
    pub fn requests(&self) -> Vec<(Option<String>, Value)> {
        self.requests.lock().unwrap().clone()
    }

    pub async fn start(self: &Arc<Self>) -> String {
        let app = Router::new()
            .route("/models/{model_call}", post(gemini_generate))
            .with_state(Arc::clone(self));
        format!("http://{}", serve(app).await)
    }
}

async fn gemini_generate(
    State(stub): State<Arc<GeminiStub>>,
    Path(_model_call): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let key = headers
        .get("x-goog-api-key")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    stub.requests.lock().unwrap().push((key, body));
    (stub.status, Json(stub.body.clone()))
}

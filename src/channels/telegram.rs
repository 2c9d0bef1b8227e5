//! Telegram channel: Bot API over long polling or a webhook.
//!
//! Both transports decode updates with the same [`parse_update`] function and
//! feed the same message stream, so the bot never knows which one is active.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::channels::webhook::webhook_routes;
use crate::channels::{
    ButtonAction, Channel, InboundEvent, IncomingMessage, MessageStream, OutgoingResponse,
    ReplyMarkup,
};
use crate::config::TelegramTransport;
use crate::error::ChannelError;
use crate::triage::UserIdentity;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Long-poll timeout passed to `getUpdates`, in seconds.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Back-off after a failed poll.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Thin Bot API client shared by the channel, its poller and the webhook routes.
#[derive(Clone)]
pub struct TelegramApi {
    bot_token: SecretString,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramApi {
    pub fn new(bot_token: SecretString) -> Self {
        Self {
            bot_token,
            api_base: TELEGRAM_API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point the client at a different Bot API server (local bot API, tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Compare a webhook path segment against the bot token in constant time.
    pub fn token_matches(&self, candidate: &str) -> bool {
        let expected = self.bot_token.expose_secret().as_bytes();
        let candidate = candidate.as_bytes();
        if expected.len() != candidate.len() {
            return false;
        }
        expected
            .iter()
            .zip(candidate)
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.api_base,
            self.bot_token.expose_secret()
        )
    }

    /// Call a Bot API method, returning its `result` payload.
    async fn call(&self, method: &str, body: &Value) -> Result<Value, ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::Http(format!("{method}: {}", e.without_url())))?;

        let status = resp.status();
        let data: Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::Http(format!("{method}: {}", e.without_url())))?;

        if !status.is_success() || data.get("ok").and_then(Value::as_bool) != Some(true) {
            let description = data
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("no description");
            return Err(ChannelError::Http(format!(
                "{method} failed ({status}): {description}"
            )));
        }

        Ok(data.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Fetch pending updates after `offset`.
    async fn get_updates(&self, offset: i64) -> Result<Vec<Value>, ChannelError> {
        let result = self
            .call(
                "getUpdates",
                &serde_json::json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message", "callback_query"]
                }),
            )
            .await?;
        Ok(result.as_array().cloned().unwrap_or_default())
    }

    /// Acknowledge a button press so the client stops its spinner.
    pub async fn answer_callback_query(&self, callback_id: &str) -> Result<(), ChannelError> {
        self.call(
            "answerCallbackQuery",
            &serde_json::json!({ "callback_query_id": callback_id }),
        )
        .await
        .map(|_| ())
    }

    /// Acknowledge a callback that will never be dispatched.
    pub async fn dismiss_callback(&self, callback_id: &str) {
        if let Err(e) = self.answer_callback_query(callback_id).await {
            tracing::debug!("answerCallbackQuery for rejected callback failed: {e}");
        }
    }
}

/// Outcome of decoding one Bot API update.
#[derive(Debug)]
pub enum ParsedUpdate {
    Message(IncomingMessage),
    /// Button press with an unknown token: acknowledged, never dispatched.
    RejectedCallback { callback_id: String },
}

/// Whether replies are sent as plain text or Markdown with plain fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextFormat {
    Plain,
    MarkdownFirst,
}

/// Telegram channel.
pub struct TelegramChannel {
    api: TelegramApi,
    transport: TelegramTransport,
}

impl TelegramChannel {
    /// Create a polling channel.
    pub fn new(bot_token: SecretString) -> Self {
        Self {
            api: TelegramApi::new(bot_token),
            transport: TelegramTransport::Polling,
        }
    }

    pub fn with_transport(mut self, transport: TelegramTransport) -> Self {
        self.transport = transport;
        self
    }

    /// Point the client at a different Bot API server (local bot API, tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api = self.api.with_api_base(api_base);
        self
    }

    fn api_url(&self, method: &str) -> String {
        self.api.api_url(method)
    }

    /// Public webhook URL for a given base URL.
    pub fn webhook_url(&self, base_url: &str) -> String {
        format!(
            "{}/webhook/{}",
            base_url.trim_end_matches('/'),
            self.api.bot_token.expose_secret()
        )
    }

    /// Send a plain text message exactly as given.
    /// Splits long messages that exceed Telegram's 4096 char limit.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        self.send_text(chat_id, text, None, TextFormat::Plain).await
    }

    /// Like [`send_message`](Self::send_message), attaching `markup` to the last chunk.
    pub async fn send_message_with_markup(
        &self,
        chat_id: &str,
        text: &str,
        markup: Option<ReplyMarkup>,
    ) -> Result<(), ChannelError> {
        self.send_text(chat_id, text, markup, TextFormat::Plain).await
    }

    /// Send a message the bot composed itself, trying Markdown first with
    /// plain text fallback.
    pub async fn send_markdown(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        self.send_text(chat_id, text, None, TextFormat::MarkdownFirst).await
    }

    async fn send_text(
        &self,
        chat_id: &str,
        text: &str,
        markup: Option<ReplyMarkup>,
        format: TextFormat,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let mut body = serde_json::json!({
                "chat_id": chat_id,
                "text": chunk,
            });
            if i == last
                && let Some(markup) = markup
            {
                body["reply_markup"] = inline_keyboard(markup);
            }
            self.send_call("sendMessage", body, format).await?;
        }
        Ok(())
    }

    /// Replace the text of a message the bot sent earlier.
    pub async fn edit_message_text(
        &self,
        chat_id: &str,
        message_id: i64,
        text: &str,
    ) -> Result<(), ChannelError> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
        });
        self.send_call("editMessageText", body, TextFormat::Plain).await
    }

    /// Acknowledge a button press so the client stops its spinner.
    pub async fn answer_callback_query(&self, callback_id: &str) -> Result<(), ChannelError> {
        self.api.answer_callback_query(callback_id).await
    }

    /// Register the webhook with Telegram.
    pub async fn set_webhook(&self, url: &str) -> Result<(), ChannelError> {
        self.api
            .call(
                "setWebhook",
                &serde_json::json!({
                    "url": url,
                    "allowed_updates": ["message", "callback_query"]
                }),
            )
            .await
            .map(|_| ())
    }

    /// Remove any registered webhook; `getUpdates` is refused while one is set.
    pub async fn delete_webhook(&self) -> Result<(), ChannelError> {
        self.api
            .call("deleteWebhook", &serde_json::json!({}))
            .await
            .map(|_| ())
    }

    async fn send_call(
        &self,
        method: &str,
        body: Value,
        format: TextFormat,
    ) -> Result<(), ChannelError> {
        if format == TextFormat::MarkdownFirst {
            return self.call_markdown_first(method, body).await;
        }
        self.api
            .call(method, &body)
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("{method} failed: {e}"),
            })
    }

    /// Try `parse_mode: Markdown`, then retry the same call as plain text.
    async fn call_markdown_first(&self, method: &str, body: Value) -> Result<(), ChannelError> {
        let mut markdown_body = body.clone();
        markdown_body["parse_mode"] = Value::String("Markdown".into());

        let markdown_err = match self.api.call(method, &markdown_body).await {
            Ok(_) => return Ok(()),
            Err(e) => e,
        };
        tracing::warn!(
            method,
            error = %markdown_err,
            "Telegram call with Markdown failed; retrying without parse_mode"
        );

        self.api
            .call(method, &body)
            .await
            .map(|_| ())
            .map_err(|plain_err| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("{method} failed (markdown: {markdown_err}, plain: {plain_err})"),
            })
    }

    fn spawn_poller(&self, tx: mpsc::UnboundedSender<IncomingMessage>) {
        let api = self.api.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel polling for updates...");

            loop {
                let updates = match api.get_updates(offset).await {
                    Ok(updates) => updates,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                for update in &updates {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    match parse_update(update) {
                        Some(ParsedUpdate::Message(incoming)) => {
                            if tx.send(incoming).is_err() {
                                tracing::info!("Telegram listener channel closed");
                                return;
                            }
                        }
                        Some(ParsedUpdate::RejectedCallback { callback_id }) => {
                            api.dismiss_callback(&callback_id).await;
                        }
                        None => {}
                    }
                }
            }
        });
    }

    async fn spawn_webhook_server(
        &self,
        listen: std::net::SocketAddr,
        base_url: &str,
        tx: mpsc::UnboundedSender<IncomingMessage>,
    ) -> Result<(), ChannelError> {
        let startup_failed = |reason: String| ChannelError::StartupFailed {
            name: "telegram".into(),
            reason,
        };

        let listener = tokio::net::TcpListener::bind(listen)
            .await
            .map_err(|e| startup_failed(format!("bind {listen}: {e}")))?;
        let app = webhook_routes(self.api.clone(), tx);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Webhook server stopped: {e}");
            }
        });
        tracing::info!(%listen, "Webhook server started");

        self.set_webhook(&self.webhook_url(base_url))
            .await
            .map_err(|e| startup_failed(format!("setWebhook: {e}")))?;
        tracing::info!(base_url, "Telegram webhook registered");
        Ok(())
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = mpsc::unbounded_channel();

        match &self.transport {
            TelegramTransport::Webhook { listen, base_url } => {
                self.spawn_webhook_server(*listen, base_url, tx).await?;
            }
            TelegramTransport::Polling => {
                if let Err(e) = self.delete_webhook().await {
                    tracing::warn!("Could not clear Telegram webhook before polling: {e}");
                }
                self.spawn_poller(tx);
            }
        }

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        if let InboundEvent::Button {
            callback_id: Some(ref callback_id),
            ..
        } = msg.event
        {
            if let Err(e) = self.answer_callback_query(callback_id).await {
                tracing::debug!("answerCallbackQuery failed: {e}");
            }
        }

        let chat_id = msg
            .metadata_str("chat_id")
            .ok_or_else(|| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: "No chat_id in message metadata".into(),
            })?;

        let message_id = msg.metadata.get("message_id").and_then(Value::as_i64);
        if let (true, Some(message_id)) = (response.edit, message_id) {
            match self
                .edit_message_text(chat_id, message_id, &response.content)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) => tracing::warn!("editMessageText failed, sending new message: {e}"),
            }
        }

        self.send_message_with_markup(chat_id, &response.content, response.markup)
            .await
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        self.api
            .call("getMe", &serde_json::json!({}))
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Decode one Bot API update.
///
/// Handles text messages and inline-button callbacks. Callbacks with an
/// unknown token come back as [`ParsedUpdate::RejectedCallback`] so the caller
/// can still acknowledge them. Returns `None` for anything else (stickers,
/// edits, unknown commands).
pub fn parse_update(update: &Value) -> Option<ParsedUpdate> {
    if let Some(message) = update.get("message") {
        let text = message.get("text").and_then(Value::as_str)?;
        let event = InboundEvent::from_text(text)?;
        let user = parse_user(message.get("from")?)?;
        let chat_id = message.get("chat")?.get("id").and_then(Value::as_i64)?;

        return Some(ParsedUpdate::Message(
            IncomingMessage::new("telegram", user, event).with_metadata(serde_json::json!({
                "chat_id": chat_id.to_string(),
                "message_id": message.get("message_id").and_then(Value::as_i64),
            })),
        ));
    }

    if let Some(callback) = update.get("callback_query") {
        let callback_id = callback.get("id").and_then(Value::as_str)?;
        let data = callback.get("data").and_then(Value::as_str)?;
        let action = match data.parse::<ButtonAction>() {
            Ok(action) => action,
            Err(e) => {
                tracing::warn!("Rejecting Telegram callback: {e}");
                return Some(ParsedUpdate::RejectedCallback {
                    callback_id: callback_id.to_string(),
                });
            }
        };
        let user = parse_user(callback.get("from")?)?;
        let message = callback.get("message")?;
        let chat_id = message.get("chat")?.get("id").and_then(Value::as_i64)?;

        return Some(ParsedUpdate::Message(
            IncomingMessage::new(
                "telegram",
                user,
                InboundEvent::Button {
                    action,
                    callback_id: Some(callback_id.to_string()),
                },
            )
            .with_metadata(serde_json::json!({
                "chat_id": chat_id.to_string(),
                "message_id": message.get("message_id").and_then(Value::as_i64),
            })),
        ));
    }

    None
}

fn parse_user(from: &Value) -> Option<UserIdentity> {
    let id = from.get("id").and_then(Value::as_i64)?;
    let username = from.get("username").and_then(Value::as_str);
    let first_name = from.get("first_name").and_then(Value::as_str);
    let last_name = from.get("last_name").and_then(Value::as_str);

    let display_name = match (first_name, last_name) {
        (Some(first), Some(last)) => format!("{first} {last}"),
        (Some(first), None) => first.to_string(),
        _ => username.unwrap_or("unknown").to_string(),
    };

    let mut user = UserIdentity::new(id.to_string(), display_name);
    if let Some(username) = username {
        user = user.with_username(username);
    }
    Some(user)
}

/// Render a reply keyboard as Bot API `reply_markup`.
fn inline_keyboard(markup: ReplyMarkup) -> Value {
    let row: Vec<Value> = markup
        .buttons()
        .iter()
        .map(|action| {
            serde_json::json!({
                "text": action.label(),
                "callback_data": action.token(),
            })
        })
        .collect();
    serde_json::json!({ "inline_keyboard": [row] })
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts on a char boundary.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        // Largest char boundary within the limit
        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }

        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { limit } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────

//! Channel trait and the message envelope shared by all transports.

use std::pin::Pin;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChannelError;
use crate::triage::UserIdentity;

/// Stream of inbound messages produced by a started channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// Bot commands understood by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Start,
    Help,
    Human,
    Faqs,
}

impl Command {
    /// Parse `/name`, `/name@botname` or `/name args`. Unknown names yield `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let rest = text.trim().strip_prefix('/')?;
        let word = rest.split_whitespace().next()?;
        let name = word.split('@').next().unwrap_or(word);
        match name.to_lowercase().as_str() {
            "start" => Some(Command::Start),
            "help" => Some(Command::Help),
            "human" | "humano" | "agente" => Some(Command::Human),
            "faqs" | "faq" => Some(Command::Faqs),
            _ => None,
        }
    }
}

/// Inline-button actions, decoded once from their callback tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonAction {
    Faqs,
    Human,
}

impl ButtonAction {
    /// Opaque token carried by the button.
    pub fn token(&self) -> &'static str {
        match self {
            ButtonAction::Faqs => "faqs",
            ButtonAction::Human => "human",
        }
    }

    /// Button caption.
    pub fn label(&self) -> &'static str {
        match self {
            ButtonAction::Faqs => "📌 FAQs",
            ButtonAction::Human => "🧑💻 Agente Humano",
        }
    }
}

impl FromStr for ButtonAction {
    type Err = ChannelError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "faqs" => Ok(ButtonAction::Faqs),
            "human" => Ok(ButtonAction::Human),
            other => Err(ChannelError::InvalidMessage(format!(
                "unknown callback token '{other}'"
            ))),
        }
    }
}

/// What the user did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Free-form text to triage.
    Text { text: String },
    /// A recognised bot command.
    Command { command: Command },
    /// An inline-button press.
    Button {
        action: ButtonAction,
        /// Channel handle used to acknowledge the press.
        callback_id: Option<String>,
    },
}

impl InboundEvent {
    /// Classify raw message text.
    ///
    /// Returns `None` for blank text and for unknown `/commands`; neither
    /// reaches the pipeline.
    pub fn from_text(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with('/') {
            return Command::parse(trimmed).map(|command| InboundEvent::Command { command });
        }
        Some(InboundEvent::Text {
            text: text.to_string(),
        })
    }
}

/// Unified inbound message from any channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: Uuid,
    /// Source channel: "telegram", "cli", ...
    pub channel: String,
    pub user: UserIdentity,
    pub event: InboundEvent,
    /// Channel-specific routing data (chat ID, message ID, ...).
    pub metadata: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(channel: impl Into<String>, user: UserIdentity, event: InboundEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.into(),
            user,
            event,
            metadata: serde_json::Value::Null,
            received_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// String-valued metadata field.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(serde_json::Value::as_str)
    }
}

/// Reply keyboards a channel may render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMarkup {
    /// Two inline buttons: FAQs and human agent.
    MainMenu,
}

impl ReplyMarkup {
    pub fn buttons(&self) -> &'static [ButtonAction] {
        match self {
            ReplyMarkup::MainMenu => &[ButtonAction::Faqs, ButtonAction::Human],
        }
    }
}

/// A reply to send back on the originating channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingResponse {
    pub content: String,
    pub markup: Option<ReplyMarkup>,
    /// Replace the message that carried the pressed button instead of sending anew.
    pub edit: bool,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            markup: None,
            edit: false,
        }
    }

    pub fn with_menu(mut self) -> Self {
        self.markup = Some(ReplyMarkup::MainMenu);
        self
    }

    pub fn editing(mut self) -> Self {
        self.edit = true;
        self
    }
}

/// A messaging transport.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Begin receiving; messages arrive on the returned stream.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Send a reply for `msg`.
    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

//! Escalation sink: hands a conversation to human support staff.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::channels::TelegramChannel;
use crate::error::EscalationError;
use crate::triage::UserIdentity;

/// A request for a human to pick up a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationNotice {
    pub user: UserIdentity,
    /// The normalized query that triggered escalation; `None` for explicit requests.
    pub query: Option<String>,
}

impl EscalationNotice {
    pub fn new(user: UserIdentity, query: Option<String>) -> Self {
        Self { user, query }
    }

    /// Render the support-channel notification.
    ///
    /// `user_label` is how the sink chooses to present the user (plain name,
    /// a channel mention, ...); `no_query_marker` stands in for a missing query.
    pub fn render(&self, user_label: &str, no_query_marker: &str) -> String {
        format!(
            "🚨 Escalamiento requerido\nUsuario: {}\nConsulta: {}",
            user_label,
            self.query.as_deref().unwrap_or(no_query_marker)
        )
    }
}

/// Notification channel for human operators.
#[async_trait]
pub trait EscalationSink: Send + Sync {
    /// Deliver one escalation notice.
    async fn notify(&self, notice: &EscalationNotice) -> Result<(), EscalationError>;
}

/// Posts escalation notices to a Telegram support chat.
pub struct TelegramEscalationSink {
    channel: Arc<TelegramChannel>,
    support_chat_id: String,
    no_query_marker: String,
}

impl TelegramEscalationSink {
    pub fn new(
        channel: Arc<TelegramChannel>,
        support_chat_id: impl Into<String>,
        no_query_marker: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            support_chat_id: support_chat_id.into(),
            no_query_marker: no_query_marker.into(),
        }
    }

    /// Markdown text of the notice, mentioning the user by ID.
    pub fn format(&self, notice: &EscalationNotice) -> String {
        notice.render(&mention_markdown(&notice.user), &self.no_query_marker)
    }
}

#[async_trait]
impl EscalationSink for TelegramEscalationSink {
    async fn notify(&self, notice: &EscalationNotice) -> Result<(), EscalationError> {
        let text = self.format(notice);
        self.channel.send_markdown(&self.support_chat_id, &text).await?;
        tracing::info!(
            user = %notice.user.id,
            support_chat = %self.support_chat_id,
            "Escalation notice delivered"
        );
        Ok(())
    }
}

/// Telegram Markdown (v1) inline mention: `[Name](tg://user?id=123)`.
pub fn mention_markdown(user: &UserIdentity) -> String {
    let name: String = user
        .display_name
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | '(' | ')' | '*' | '_' | '`'))
        .collect();
    let name = if name.trim().is_empty() {
        user.id.clone()
    } else {
        name
    };
    match user.id.parse::<i64>() {
        Ok(id) => format!("[{name}](tg://user?id={id})"),
        Err(_) => name,
    }
}

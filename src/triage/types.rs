//! Shared types for the triage pipeline.

use serde::{Deserialize, Serialize};

/// Who sent a message, as far as the pipeline cares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Channel-native stable identifier (Telegram numeric user ID, etc.).
    pub id: String,
    /// Human-readable name shown to support staff.
    pub display_name: String,
    /// Channel handle, if the user has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            username: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

/// Which path produced the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageSource {
    /// Answered from the static FAQ.
    KnowledgeBase,
    /// Generated answer shown unmodified.
    Generated,
    /// Handed to a human; the user sees the canned acknowledgment.
    Escalated,
    /// Completion service failed or timed out.
    Failed,
}

impl TriageSource {
    pub fn label(&self) -> &'static str {
        match self {
            TriageSource::KnowledgeBase => "knowledge_base",
            TriageSource::Generated => "generated",
            TriageSource::Escalated => "escalated",
            TriageSource::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TriageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of triaging one message. Always carries user-visible text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageResult {
    pub source: TriageSource,
    pub text: String,
    /// Whether the escalation sink was notified for this message.
    pub escalation_requested: bool,
}

impl TriageResult {
    pub fn knowledge_base(answer: impl Into<String>) -> Self {
        Self {
            source: TriageSource::KnowledgeBase,
            text: answer.into(),
            escalation_requested: false,
        }
    }

    pub fn generated(text: impl Into<String>) -> Self {
        Self {
            source: TriageSource::Generated,
            text: text.into(),
            escalation_requested: false,
        }
    }

    pub fn escalated(acknowledgment: impl Into<String>) -> Self {
        Self {
            source: TriageSource::Escalated,
            text: acknowledgment.into(),
            escalation_requested: true,
        }
    }

    pub fn failed(apology: impl Into<String>) -> Self {
        Self {
            source: TriageSource::Failed,
            text: apology.into(),
            escalation_requested: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_serializes_snake_case() {
        let json = serde_json::to_string(&TriageSource::KnowledgeBase).unwrap();
        assert_eq!(json, r#""knowledge_base""#);
        let back: TriageSource = serde_json::from_str(r#""escalated""#).unwrap();
        assert_eq!(back, TriageSource::Escalated);
    }

    #[test]
    fn only_escalated_requests_escalation() {
        assert!(TriageResult::escalated("ack").escalation_requested);
        assert!(!TriageResult::generated("x").escalation_requested);
        assert!(!TriageResult::knowledge_base("x").escalation_requested);
        assert!(!TriageResult::failed("x").escalation_requested);
    }

    #[test]
    fn user_identity_skips_missing_username() {
        let json = serde_json::to_value(UserIdentity::new("42", "Ana")).unwrap();
        assert!(json.get("username").is_none());
        let user = UserIdentity::new("42", "Ana").with_username("ana_g");
        let json = serde_json::to_value(user).unwrap();
        assert_eq!(json["username"], "ana_g");
    }
}

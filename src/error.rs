//! Error types for the helpdesk triage bot.

use std::time::Duration;

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Knowledge base error: {0}")]
    KnowledgeBase(#[from] KnowledgeBaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Escalation error: {0}")]
    Escalation(#[from] EscalationError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Knowledge base loading errors.
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeBaseError {
    #[error("Failed to read knowledge base {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed knowledge base document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Completion service errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Escalation sink errors.
#[derive(Debug, thiserror::Error)]
pub enum EscalationError {
    #[error("Escalation delivery failed: {0}")]
    Delivery(String),

    #[error("Escalation timed out after {0:?}")]
    Timeout(Duration),
}

impl From<ChannelError> for EscalationError {
    fn from(e: ChannelError) -> Self {
        EscalationError::Delivery(e.to_string())
    }
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;

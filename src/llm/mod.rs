//! Completion service integration.
//!
//! Supports:
//! - **Gemini**: direct REST calls to `generateContent` (default backend)
//! - **Anthropic**: via rig-core
//! - **OpenAI**: via rig-core
//!
//! The triage pipeline only sees the [`CompletionService`] trait: one prompt
//! in, free text out.

mod gemini;
mod rig_adapter;

pub use gemini::GeminiClient;
pub use rig_adapter::RigCompletion;

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::LlmError;

/// Upper bound on generated tokens for rig-backed providers.
const MAX_COMPLETION_TOKENS: u64 = 1024;

/// A generative text backend.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Model identifier, for logging.
    fn model_name(&self) -> &str;

    /// Generate a free-text answer for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Gemini,
    Anthropic,
    OpenAi,
}

impl LlmBackend {
    pub fn label(&self) -> &'static str {
        match self {
            LlmBackend::Gemini => "gemini",
            LlmBackend::Anthropic => "anthropic",
            LlmBackend::OpenAi => "openai",
        }
    }

    /// Model used when `HELPDESK_MODEL` is not set.
    pub fn default_model(&self) -> &'static str {
        match self {
            LlmBackend::Gemini => "gemini-2.0-flash",
            LlmBackend::Anthropic => "claude-sonnet-4-20250514",
            LlmBackend::OpenAi => "gpt-4o-mini",
        }
    }
}

impl FromStr for LlmBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(LlmBackend::Gemini),
            "anthropic" | "claude" => Ok(LlmBackend::Anthropic),
            "openai" => Ok(LlmBackend::OpenAi),
            other => Err(format!(
                "unknown backend '{other}', expected gemini, anthropic or openai"
            )),
        }
    }
}

/// Configuration for creating a completion provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Create a completion provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn CompletionService>, LlmError> {
    match config.backend {
        LlmBackend::Gemini => {
            tracing::info!("Using Gemini (model: {})", config.model);
            Ok(Arc::new(GeminiClient::new(
                config.api_key.clone(),
                &config.model,
            )?))
        }
        LlmBackend::Anthropic => create_anthropic_provider(config),
        LlmBackend::OpenAi => create_openai_provider(config),
    }
}

fn create_anthropic_provider(config: &LlmConfig) -> Result<Arc<dyn CompletionService>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("Failed to create Anthropic client: {}", e),
            }
        })?;

    let agent = client
        .agent(&config.model)
        .max_tokens(MAX_COMPLETION_TOKENS)
        .build();
    tracing::info!("Using Anthropic (model: {})", config.model);
    Ok(Arc::new(RigCompletion::new(agent, "anthropic", &config.model)))
}

fn create_openai_provider(config: &LlmConfig) -> Result<Arc<dyn CompletionService>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            }
        })?;

    let agent = client
        .agent(&config.model)
        .max_tokens(MAX_COMPLETION_TOKENS)
        .build();
    tracing::info!("Using OpenAI (model: {})", config.model);
    Ok(Arc::new(RigCompletion::new(agent, "openai", &config.model)))
}

//! Gemini `generateContent` client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::CompletionService;
use crate::error::LlmError;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Transport-level ceiling; the pipeline applies its own, usually tighter, deadline.
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

const PROVIDER: &str = "gemini";

/// Direct REST client for Google's Gemini models.
pub struct GeminiClient {
    api_key: SecretString,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: SecretString, model: &str) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.into(),
                reason: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            api_key,
            model: model.to_string(),
            base_url: GEMINI_API_BASE.to_string(),
            client,
        })
    }

    /// Point the client at a different API root (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl CompletionService for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }]
        });

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.into(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(LlmError::AuthFailed {
                provider: PROVIDER.into(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                provider: PROVIDER.into(),
                reason: format!("Gemini API error ({status}): {body}"),
            });
        }

        let raw = response.text().await.map_err(|e| LlmError::InvalidResponse {
            provider: PROVIDER.into(),
            reason: e.to_string(),
        })?;
        let parsed: GenerateContentResponse = serde_json::from_str(&raw)?;
        extract_text(parsed)
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

/// Concatenate the text parts of the first candidate.
fn extract_text(response: GenerateContentResponse) -> Result<String, LlmError> {
    let invalid = |reason: String| LlmError::InvalidResponse {
        provider: PROVIDER.into(),
        reason,
    };

    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(invalid(format!("prompt blocked: {reason}")));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| invalid("no candidates returned".into()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(invalid(format!(
            "empty candidate (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }
    Ok(text)
}

//! Bridges rig-core agents to [`CompletionService`].

use async_trait::async_trait;
use rig::completion::Prompt;

use super::CompletionService;
use crate::error::LlmError;

/// A rig agent (any provider) exposed as a completion service.
pub struct RigCompletion<A> {
    agent: A,
    provider: &'static str,
    model: String,
}

impl<A> RigCompletion<A> {
    pub fn new(agent: A, provider: &'static str, model: &str) -> Self {
        Self {
            agent,
            provider,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl<A> CompletionService for RigCompletion<A>
where
    A: Prompt + Send + Sync,
{
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.agent
            .prompt(prompt)
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: self.provider.to_string(),
                reason: e.to_string(),
            })
    }
}

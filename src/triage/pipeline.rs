//! Triage pipeline: routes one message to FAQ, generated answer, or a human.
//!
//! **Core invariant: every call yields user-visible text.** Completion
//! failures and timeouts become the technical-difficulties message; escalation
//! sink failures are logged and never change the reply.
//!
//! Flow:
//! 1. Knowledge base (fast, no LLM) → may short-circuit
//! 2. Completion service, bounded by `completion_timeout`
//! 3. Escalation classifier → canned acknowledgment + support notice, or
//!    the generated answer verbatim

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::config::{BotMessages, QUERY_PLACEHOLDER, TriageConfig};
use crate::error::{EscalationError, LlmError};
use crate::escalation::{EscalationNotice, EscalationSink};
use crate::knowledge::KnowledgeBase;
use crate::llm::CompletionService;
use crate::triage::classifier::EscalationClassifier;
use crate::triage::types::{TriageResult, UserIdentity};

/// Interpolate the normalized query into the prompt template.
pub fn build_prompt(template: &str, query: &str) -> String {
    template.replace(QUERY_PLACEHOLDER, query)
}

/// Stateless-per-message triage orchestrator.
///
/// Holds only immutable, shared collaborators, so one instance can serve any
/// number of concurrent messages.
pub struct TriagePipeline {
    knowledge: Arc<KnowledgeBase>,
    completion: Arc<dyn CompletionService>,
    sink: Arc<dyn EscalationSink>,
    classifier: EscalationClassifier,
    config: TriageConfig,
}

impl TriagePipeline {
    pub fn new(
        knowledge: Arc<KnowledgeBase>,
        completion: Arc<dyn CompletionService>,
        sink: Arc<dyn EscalationSink>,
        config: TriageConfig,
    ) -> Self {
        let classifier = EscalationClassifier::new(&config.escalation_triggers);
        Self {
            knowledge,
            completion,
            sink,
            classifier,
            config,
        }
    }

    pub fn messages(&self) -> &BotMessages {
        &self.config.messages
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    /// Triage one free-form message.
    pub async fn handle(&self, raw_message: &str, user: &UserIdentity) -> TriageResult {
        let query = raw_message.to_lowercase();

        // Step 1: static FAQ
        if let Some(answer) = self.knowledge.match_query(&query) {
            info!(user = %user.id, source = "knowledge_base", "Answered from FAQ");
            return TriageResult::knowledge_base(answer);
        }

        // Step 2: generative fallback
        let generated = match self.generate(&query).await {
            Ok(text) => text,
            Err(e) => {
                error!(user = %user.id, error = %e, "Completion service failed");
                return TriageResult::failed(&self.config.messages.technical_difficulties);
            }
        };

        // Step 3: escalation check; the generated text is dropped on escalation
        if let Some(trigger) = self.classifier.matched_trigger(&generated) {
            info!(
                user = %user.id,
                trigger,
                "Generated answer signals hand-off, escalating"
            );
            self.notify(EscalationNotice::new(user.clone(), Some(query))).await;
            return TriageResult::escalated(&self.config.messages.escalation_ack);
        }

        info!(user = %user.id, source = "generated", "Answered with generated text");
        TriageResult::generated(generated)
    }

    /// Explicit request for a human (command or button). Never calls the LLM.
    pub async fn escalate(&self, user: &UserIdentity) -> TriageResult {
        info!(user = %user.id, "Explicit escalation requested");
        self.notify(EscalationNotice::new(user.clone(), None)).await;
        TriageResult::escalated(&self.config.messages.explicit_escalation_ack)
    }

    /// All FAQ questions as one formatted block, in load order.
    pub fn list_topics(&self) -> String {
        self.knowledge.render_listing(&self.config.messages.faq_header)
    }

    /// Call the completion service under the configured deadline.
    ///
    /// On timeout the in-flight request future is dropped, which cancels it.
    async fn generate(&self, query: &str) -> Result<String, LlmError> {
        let prompt = build_prompt(&self.config.prompt_template, query);
        let timeout = self.config.completion_timeout;
        debug!(model = self.completion.model_name(), prompt = %prompt, "Completion prompt");

        let started = Instant::now();
        let request = self.completion.generate(&prompt);
        let result = match tokio::time::timeout(timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout {
                provider: self.completion.model_name().to_string(),
                timeout,
            }),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(text) => debug!(elapsed_ms, response = %text, "Completion response"),
            Err(e) => debug!(elapsed_ms, error = %e, "Completion attempt failed"),
        }
        result
    }

    /// Attempt delivery to the escalation sink, bounded by `escalation_timeout`.
    ///
    /// Failures are logged only.
    async fn notify(&self, notice: EscalationNotice) {
        let timeout = self.config.escalation_timeout;
        let outcome = match tokio::time::timeout(timeout, self.sink.notify(&notice)).await {
            Ok(result) => result,
            Err(_) => Err(EscalationError::Timeout(timeout)),
        };

        match outcome {
            Ok(()) => {}
            Err(EscalationError::Timeout(t)) => {
                warn!(user = %notice.user.id, timeout = ?t, "Escalation notice timed out");
            }
            Err(e) => {
                error!(user = %notice.user.id, error = %e, "Escalation notice failed");
            }
        }
    }
}

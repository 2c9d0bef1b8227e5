//! Escalation heuristic for generated answers.
//!
//! A generated answer that admits it cannot help (or offers a hand-off) is
//! never shown to the user. The check is plain case-insensitive substring
//! containment; over-escalation is preferred to letting a useless answer
//! through.

use crate::config::DEFAULT_ESCALATION_TRIGGERS;

/// Flags generated text that signals the assistant's own inability to help.
#[derive(Debug, Clone)]
pub struct EscalationClassifier {
    /// Lower-cased, non-empty trigger phrases.
    triggers: Vec<String>,
}

impl EscalationClassifier {
    pub fn new<I, S>(triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            triggers: triggers
                .into_iter()
                .map(|t| t.as_ref().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Whether `answer` contains any trigger phrase.
    pub fn needs_escalation(&self, answer: &str) -> bool {
        self.matched_trigger(answer).is_some()
    }

    /// The first trigger found in `answer`, if any.
    pub fn matched_trigger(&self, answer: &str) -> Option<&str> {
        let normalized = answer.to_lowercase();
        self.triggers
            .iter()
            .find(|t| normalized.contains(t.as_str()))
            .map(String::as_str)
    }

    pub fn triggers(&self) -> &[String] {
        &self.triggers
    }
}

impl Default for EscalationClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_ESCALATION_TRIGGERS)
    }
}

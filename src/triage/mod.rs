//! Message triage.
//!
//! Every free-form message flows through:
//! 1. `KnowledgeBase::match_query()`: static FAQ lookup (no LLM)
//! 2. `CompletionService::generate()`: generative fallback
//! 3. `EscalationClassifier::needs_escalation()`: decides whether the
//!    generated answer is shown or replaced by a hand-off to a human
//!
//! Each message is triaged independently; nothing is shared between
//! invocations except the immutable knowledge base.

pub mod classifier;
pub mod pipeline;
pub mod types;

pub use classifier::EscalationClassifier;
pub use pipeline::{TriagePipeline, build_prompt};
pub use types::{TriageResult, TriageSource, UserIdentity};

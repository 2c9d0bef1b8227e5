//! Helpdesk triage bot: answers support questions from a static FAQ, falls
//! back to a completion service, and hands off to humans when needed.

pub mod bot;
pub mod channels;
pub mod config;
pub mod error;
pub mod escalation;
pub mod knowledge;
pub mod llm;
pub mod triage;

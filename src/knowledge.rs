//! Static FAQ knowledge base.
//!
//! Loaded once at startup from a JSON document of the form
//! `[{"question": "...", "answer": "...", "keywords": ["..."]}]` and never
//! mutated afterwards. Lookup is plain substring containment against the
//! lower-cased query; entries are tried in load order and the first hit wins.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::KnowledgeBaseError;

/// One question/answer record with its keyword triggers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqEntry {
    /// Display label, only used when listing topics.
    pub question: String,
    /// Text sent back to the user on a match.
    pub answer: String,
    /// Lower-cased substrings that select this entry.
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl FaqEntry {
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        keywords: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            keywords: keywords.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether any keyword occurs in `query`.
    pub fn matches(&self, query: &str) -> bool {
        self.keywords.iter().any(|kw| query.contains(kw.as_str()))
    }
}

/// Ordered, immutable FAQ collection.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    entries: Vec<FaqEntry>,
}

impl KnowledgeBase {
    /// Build a knowledge base, normalizing keywords.
    ///
    /// Keywords are lower-cased and empty-string keywords are dropped, since
    /// an empty substring would match every query. Entries left with no
    /// keywords are kept (they still appear in the topic listing) but can
    /// never match; a warning is logged for each.
    pub fn new(entries: Vec<FaqEntry>) -> Self {
        let entries: Vec<FaqEntry> = entries
            .into_iter()
            .map(|mut entry| {
                let before = entry.keywords.len();
                entry.keywords = entry
                    .keywords
                    .iter()
                    .map(|kw| kw.to_lowercase())
                    .filter(|kw| !kw.is_empty())
                    .collect();
                if entry.keywords.len() != before {
                    warn!(
                        question = %entry.question,
                        dropped = before - entry.keywords.len(),
                        "Dropped empty keywords from FAQ entry"
                    );
                }
                if entry.keywords.is_empty() {
                    warn!(
                        question = %entry.question,
                        "FAQ entry has no keywords and will never match"
                    );
                }
                entry
            })
            .collect();

        Self { entries }
    }

    /// Parse a knowledge base from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, KnowledgeBaseError> {
        let entries: Vec<FaqEntry> = serde_json::from_str(json)?;
        Ok(Self::new(entries))
    }

    /// Load a knowledge base from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, KnowledgeBaseError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| KnowledgeBaseError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let kb = Self::from_json_str(&raw)?;
        info!(path = %path.display(), entries = kb.len(), "Loaded FAQ knowledge base");
        Ok(kb)
    }

    /// Find the answer for an already lower-cased query.
    ///
    /// Returns the answer of the first entry (in load order) with any keyword
    /// contained in `query`.
    pub fn match_query(&self, query: &str) -> Option<&str> {
        let hit = self.entries.iter().find(|entry| entry.matches(query))?;
        debug!(question = %hit.question, "FAQ match");
        Some(hit.answer.as_str())
    }

    /// Question labels in load order.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.question.as_str())
    }

    /// Render the topic listing: the header followed by one bullet per entry.
    pub fn render_listing(&self, header: &str) -> String {
        let mut out = String::from(header);
        for question in self.topics() {
            out.push_str("\n• ");
            out.push_str(question);
        }
        out
    }

    pub fn entries(&self) -> &[FaqEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! The running conversation log.
//!
//! The transcript is append-only and survives across runs: it is a chat log,
//! not a result artifact, so [`crate::state::RunState`] never clears it when a
//! new run starts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        f.write_str(s)
    }
}

/// Retrieval details attached to an assistant answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Number of document chunks the answer was grounded on.
    pub context_count: Option<u32>,
    /// Similarity of each retrieved chunk, best first.
    pub similarity_scores: Vec<f64>,
}

impl EntryMetadata {
    /// Build metadata only when the service reported something useful.
    pub fn from_response(context_count: Option<u32>, similarity_scores: Vec<f64>) -> Option<Self> {
        let has_context = context_count.is_some_and(|c| c > 0);
        if !has_context && similarity_scores.is_empty() {
            return None;
        }
        Some(Self {
            context_count,
            similarity_scores,
        })
    }

    /// Relevance of the best chunk as a percentage, e.g. `87.5`.
    pub fn top_relevance_percent(&self) -> Option<f64> {
        self.similarity_scores.first().map(|s| s * 100.0)
    }
}

/// One message in the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EntryMetadata>,
}

impl ConversationEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            metadata: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            metadata: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            text: text.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Option<EntryMetadata>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Ordered, append-only sequence of [`ConversationEntry`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct Transcript {
    entries: Vec<ConversationEntry>,
}

impl Transcript {
    pub fn push(&mut self, entry: ConversationEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&ConversationEntry> {
        self.entries.last()
    }

    /// Entries appended at or after `index`; handy for incremental display.
    pub fn since(&self, index: usize) -> &[ConversationEntry] {
        self.entries.get(index..).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_absent_when_nothing_reported() {
        assert_eq!(EntryMetadata::from_response(None, vec![]), None);
        assert_eq!(EntryMetadata::from_response(Some(0), vec![]), None);
    }

    #[test]
    fn metadata_present_with_scores_only() {
        let m = EntryMetadata::from_response(None, vec![0.875, 0.5]).unwrap();
        assert_eq!(m.top_relevance_percent(), Some(87.5));
    }

    #[test]
    fn since_past_end_is_empty() {
        let mut t = Transcript::default();
        t.push(ConversationEntry::user("oi"));
        assert_eq!(t.since(0).len(), 1);
        assert!(t.since(1).is_empty());
        assert!(t.since(7).is_empty());
    }
}

//! Citation Registry
//!
//! Collects the source citations discovered while one bot turn streams.
//! Providers may repeat the same source in many chunks; the registry keeps
//! the first occurrence of each `uri` and preserves first-seen order.

use std::collections::HashSet;

use crate::messages::Citation;

/// Per-turn citation collector
#[derive(Clone, Debug, Default)]
pub struct CitationRegistry {
    seen: HashSet<String>,
    ordered: Vec<Citation>,
}

impl CitationRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a citation; returns `true` if its `uri` was not seen before
    pub fn record(&mut self, citation: Citation) -> bool {
        if !self.seen.insert(citation.uri.clone()) {
            return false;
        }
        self.ordered.push(citation);
        true
    }

    /// Record several citations, returning how many were new
    pub fn record_all(&mut self, citations: impl IntoIterator<Item = Citation>) -> usize {
        citations
            .into_iter()
            .map(|c| self.record(c))
            .filter(|added| *added)
            .count()
    }

    /// Citations in insertion order
    #[must_use]
    pub fn citations(&self) -> &[Citation] {
        &self.ordered
    }

    /// Number of distinct citations
    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Whether nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Forget everything (start of a new bot turn)
    pub fn reset(&mut self) {
        self.seen.clear();
        self.ordered.clear();
    }

    /// Move the collected citations out, `None` when nothing was found
    pub fn take(&mut self) -> Option<Vec<Citation>> {
        self.seen.clear();
        if self.ordered.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.ordered))
        }
    }
}

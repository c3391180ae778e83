use tracing::debug;

use crate::{Chunk, ChunkId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchMatch {
    pub chunk: ChunkId,
    /// Position of the chunk in the document's ordered chunk list.
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Jump {
        target: SearchMatch,
        match_index: usize,
        total: usize,
    },
    NoMatches,
    Cleared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSummary {
    pub query: String,
    pub total: usize,
    pub current_index: Option<usize>,
}

#[derive(Debug, Clone)]
struct SearchSession {
    query: String,
    matches: Vec<SearchMatch>,
    cursor: usize,
}

/// Case-insensitive substring search with a cyclic cursor.
///
/// Submitting the query that is already active advances the cursor by one,
/// wrapping after the last match. Any other query starts a fresh session.
#[derive(Debug, Default)]
pub struct SearchNavigator {
    session: Option<SearchSession>,
}

impl SearchNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&mut self, query: &str, chunks: &[Chunk]) -> SearchOutcome {
        if query.trim().is_empty() {
            self.reset();
            return SearchOutcome::Cleared;
        }

        if let Some(session) = self.session.as_mut().filter(|s| s.query == query) {
            if session.matches.is_empty() {
                return SearchOutcome::NoMatches;
            }
            session.cursor = (session.cursor + 1) % session.matches.len();
            return SearchOutcome::Jump {
                target: session.matches[session.cursor],
                match_index: session.cursor,
                total: session.matches.len(),
            };
        }

        let needle = query.to_lowercase();
        let matches: Vec<SearchMatch> = chunks
            .iter()
            .enumerate()
            .filter(|(_, chunk)| chunk.content.to_lowercase().contains(&needle))
            .map(|(position, chunk)| SearchMatch {
                chunk: chunk.id,
                position,
            })
            .collect();
        debug!(query, matches = matches.len(), "new search session");

        let outcome = match matches.first() {
            Some(first) => SearchOutcome::Jump {
                target: *first,
                match_index: 0,
                total: matches.len(),
            },
            None => SearchOutcome::NoMatches,
        };
        self.session = Some(SearchSession {
            query: query.to_string(),
            matches,
            cursor: 0,
        });
        outcome
    }

    pub fn reset(&mut self) {
        self.session = None;
    }

    pub fn query(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.query.as_str())
    }

    pub fn current(&self) -> Option<SearchMatch> {
        self.session
            .as_ref()
            .and_then(|session| session.matches.get(session.cursor).copied())
    }

    pub fn summary(&self) -> Option<SearchSummary> {
        self.session.as_ref().map(|session| SearchSummary {
            query: session.query.clone(),
            total: session.matches.len(),
            current_index: if session.matches.is_empty() {
                None
            } else {
                Some(session.cursor)
            },
        })
    }

    /// Terms the renderer surfaces highlight for the active query.
    pub fn highlight_terms(&self) -> Vec<String> {
        self.query()
            .map(|query| query.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

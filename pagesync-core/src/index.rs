use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::estimate::{EstimationMode, PageEstimator, DEFAULT_CHUNKS_PER_PAGE};
use crate::{Chunk, ChunkId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Chunks resolved to the same page, in ordinal order.
#[derive(Debug, Clone, PartialEq)]
pub struct PageGroup {
    pub page: u32,
    pub chunks: Vec<Chunk>,
}

/// Partition of a document's chunks by resolved page.
///
/// Building the index is pure. Callers that keep a current page must clamp
/// it against [`ChunkPageIndex::max_page`] after a rebuild themselves.
#[derive(Debug, Clone, Default)]
pub struct ChunkPageIndex {
    groups: BTreeMap<u32, PageGroup>,
    page_by_chunk: HashMap<ChunkId, u32>,
    declared_total: u32,
    mode: Option<EstimationMode>,
}

impl ChunkPageIndex {
    pub fn build(chunks: &[Chunk], declared_total: u32) -> Self {
        Self::build_with_density(chunks, declared_total, DEFAULT_CHUNKS_PER_PAGE)
    }

    pub fn build_with_density(chunks: &[Chunk], declared_total: u32, chunks_per_page: u32) -> Self {
        if chunks.is_empty() {
            return Self {
                declared_total,
                ..Self::default()
            };
        }

        let estimator = PageEstimator::with_density(chunks, declared_total, chunks_per_page);
        let mut groups: BTreeMap<u32, PageGroup> = BTreeMap::new();
        let mut page_by_chunk = HashMap::with_capacity(chunks.len());

        for (index, chunk) in chunks.iter().enumerate() {
            let page = estimator.page_at(chunks, index);
            groups
                .entry(page)
                .or_insert_with(|| PageGroup {
                    page,
                    chunks: Vec::new(),
                })
                .chunks
                .push(chunk.clone());
            page_by_chunk.insert(chunk.id, page);
        }

        debug!(
            chunks = chunks.len(),
            pages = groups.len(),
            declared_total,
            mode = ?estimator.mode(),
            "built chunk page index"
        );

        Self {
            groups,
            page_by_chunk,
            declared_total,
            mode: Some(estimator.mode()),
        }
    }

    /// Pages holding at least one chunk, ascending.
    pub fn pages(&self) -> Vec<u32> {
        self.groups.keys().copied().collect()
    }

    pub fn groups(&self) -> impl Iterator<Item = &PageGroup> {
        self.groups.values()
    }

    pub fn chunks_for(&self, page: u32) -> &[Chunk] {
        self.groups
            .get(&page)
            .map(|group| group.chunks.as_slice())
            .unwrap_or(&[])
    }

    pub fn first_chunk(&self, page: u32) -> Option<&Chunk> {
        self.chunks_for(page).first()
    }

    pub fn page_of(&self, chunk: ChunkId) -> Option<u32> {
        self.page_by_chunk.get(&chunk).copied()
    }

    /// Nearest page at or beyond `page` in `direction` that holds a chunk.
    pub fn nearest_populated(&self, page: u32, direction: Direction) -> Option<u32> {
        match direction {
            Direction::Forward => self.groups.range(page..).next().map(|(key, _)| *key),
            Direction::Backward => self.groups.range(..=page).next_back().map(|(key, _)| *key),
        }
    }

    /// Nearest populated page in `direction`, falling back to the other one.
    pub fn nearest_populated_either(&self, page: u32, direction: Direction) -> Option<u32> {
        let opposite = match direction {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        };
        self.nearest_populated(page, direction)
            .or_else(|| self.nearest_populated(page, opposite))
    }

    /// Upper page bound: estimation can under- or over-shoot the declared
    /// count, so the larger of the two wins.
    pub fn max_page(&self) -> u32 {
        let largest_key = self.groups.keys().next_back().copied().unwrap_or(0);
        largest_key.max(self.declared_total)
    }

    pub fn clamp(&self, page: u32) -> u32 {
        page.clamp(1, self.max_page().max(1))
    }

    pub fn declared_total(&self) -> u32 {
        self.declared_total
    }

    pub fn mode(&self) -> Option<EstimationMode> {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.page_by_chunk.len()
    }

    pub fn is_empty(&self) -> bool {
        self.page_by_chunk.is_empty()
    }
}

//! Page resolution for chunks whose store metadata cannot be trusted.
//!
//! The decision between trusting metadata and estimating is taken once per
//! document. Mixing the two would make page numbers jump backwards as the
//! ordinal position grows.

use crate::Chunk;

/// Chunks assumed to share a page when neither metadata nor a declared page
/// count is available. A placeholder density with no measured basis.
pub const DEFAULT_CHUNKS_PER_PAGE: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimationMode {
    /// At least one chunk reported a nonzero page; metadata is used as-is.
    Metadata,
    /// No metadata, declared page count known.
    Proportional { chunk_count: usize, total_pages: u32 },
    /// No metadata and no page count.
    FixedDensity { chunks_per_page: u32 },
}

#[derive(Debug, Clone, Copy)]
pub struct PageEstimator {
    mode: EstimationMode,
}

impl PageEstimator {
    pub fn new(chunks: &[Chunk], total_pages: u32) -> Self {
        Self::with_density(chunks, total_pages, DEFAULT_CHUNKS_PER_PAGE)
    }

    pub fn with_density(chunks: &[Chunk], total_pages: u32, chunks_per_page: u32) -> Self {
        let has_metadata = chunks.iter().any(|chunk| chunk.reported_page() > 0);
        let mode = if has_metadata {
            EstimationMode::Metadata
        } else if total_pages > 0 {
            EstimationMode::Proportional {
                chunk_count: chunks.len(),
                total_pages,
            }
        } else {
            EstimationMode::FixedDensity {
                chunks_per_page: chunks_per_page.max(1),
            }
        };
        Self { mode }
    }

    pub fn mode(&self) -> EstimationMode {
        self.mode
    }

    /// Page for the chunk at `index` in the ordered list. Always at least 1.
    pub fn page_at(&self, chunks: &[Chunk], index: usize) -> u32 {
        match self.mode {
            EstimationMode::Metadata => chunks
                .get(index)
                .map(Chunk::reported_page)
                .unwrap_or(0)
                .max(1),
            EstimationMode::Proportional {
                chunk_count,
                total_pages,
            } => {
                if chunk_count == 0 {
                    return 1;
                }
                let scaled = index as u64 * u64::from(total_pages) / chunk_count as u64;
                let page = u32::try_from(scaled).unwrap_or(u32::MAX).saturating_add(1);
                page.clamp(1, total_pages)
            }
            EstimationMode::FixedDensity { chunks_per_page } => {
                let page = index as u64 / u64::from(chunks_per_page.max(1));
                u32::try_from(page).unwrap_or(u32::MAX).saturating_add(1)
            }
        }
    }

    /// Resolved pages for every chunk, in list order.
    pub fn resolve_all(&self, chunks: &[Chunk]) -> Vec<u32> {
        (0..chunks.len())
            .map(|index| self.page_at(chunks, index))
            .collect()
    }
}

/// One-shot helper for a single chunk; prefer [`PageEstimator`] in loops.
pub fn estimate_page(chunks: &[Chunk], total_pages: u32, index: usize) -> u32 {
    PageEstimator::new(chunks, total_pages).page_at(chunks, index)
}

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod config;
pub mod estimate;
pub mod index;
pub mod search;
pub mod source;
pub mod sync;
pub mod timer;
pub mod viewport;

pub use config::{load_toml, ConfigError, SyncConfig};
pub use estimate::{estimate_page, EstimationMode, PageEstimator, DEFAULT_CHUNKS_PER_PAGE};
pub use index::{ChunkPageIndex, Direction, PageGroup};
pub use search::{SearchMatch, SearchNavigator, SearchOutcome, SearchSummary};
pub use source::{ChunkSource, JsonChunkSource, MemoryChunkSource};
pub use sync::{
    ExternalSurface, Navigation, Origin, PageUpdate, PanelMode, RendererEvent, Surface,
    SurfaceError, SyncCoordinator, SyncEvent, SyncPhase,
};
pub use timer::Debouncer;
pub use viewport::{Intersection, ViewportObserver};

pub type DocumentId = Uuid;
pub type ChunkId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3f1d7c2a-5b8e-5e41-9c0a-1d2e3f405162").expect("valid namespace UUID")
});

/// Stable id for a document that the store did not assign one to.
pub fn document_id_for_source(source: &str) -> DocumentId {
    Uuid::new_v5(&DOCUMENT_NAMESPACE, source.trim().as_bytes())
}

/// Stable id for the chunk at `ordinal` within `document`.
pub fn chunk_id_for(document: DocumentId, ordinal: usize) -> ChunkId {
    let mut name = document.as_bytes().to_vec();
    name.extend_from_slice(&(ordinal as u64).to_be_bytes());
    Uuid::new_v5(&DOCUMENT_NAMESPACE, &name)
}

/// A stored fragment of a document's text.
///
/// Identity and content never change once loaded. The page a chunk is shown
/// on is derived by [`ChunkPageIndex`] and is not stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub content: String,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub section: Option<String>,
    pub ordinal: usize,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Chunk {
    pub fn new(document_id: DocumentId, ordinal: usize, content: impl Into<String>) -> Self {
        Self {
            id: chunk_id_for(document_id, ordinal),
            document_id,
            content: content.into(),
            page: None,
            section: None,
            ordinal,
            keywords: Vec::new(),
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Page number as reported by the store, 0 when absent.
    pub fn reported_page(&self) -> u32 {
        self.page.unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    /// Declared page count, 0 while unknown.
    #[serde(default)]
    pub total_pages: u32,
    /// File name or URL the renderer surfaces load the document from.
    #[serde(default)]
    pub source: Option<String>,
}

impl Document {
    pub fn new(id: DocumentId, title: impl Into<String>, total_pages: u32) -> Self {
        Self {
            id,
            title: title.into(),
            total_pages,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.source
            .as_deref()
            .map(str::trim)
            .filter(|source| !source.is_empty())
    }
}

/// Builds `count` chunks with no page metadata, content `"chunk {n}"`.
#[cfg(test)]
pub(crate) fn plain_chunks(document: DocumentId, count: usize) -> Vec<Chunk> {
    (0..count)
        .map(|ordinal| Chunk::new(document, ordinal, format!("chunk {}", ordinal)))
        .collect()
}

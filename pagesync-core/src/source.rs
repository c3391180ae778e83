use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::instrument;

use crate::{chunk_id_for, document_id_for_source, Chunk, ChunkId, Document, DocumentId};

/// Read-only access to the document store.
///
/// The two calls are independent and may complete in either order.
#[async_trait]
pub trait ChunkSource: Send + Sync {
    async fn document(&self, id: DocumentId) -> Result<Document>;
    async fn chunks(&self, id: DocumentId) -> Result<Vec<Chunk>>;
}

#[derive(Debug, Deserialize)]
struct DocumentFile {
    #[serde(default)]
    id: Option<DocumentId>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    total_pages: u32,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    chunks: Vec<ChunkRecord>,
}

#[derive(Debug, Deserialize)]
struct ChunkRecord {
    #[serde(default)]
    id: Option<ChunkId>,
    content: String,
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    section: Option<String>,
    #[serde(default)]
    ordinal: Option<usize>,
    #[serde(default)]
    keywords: Vec<String>,
}

/// A single document exported to JSON.
///
/// Ids the export omits are derived from the file path and chunk position.
pub struct JsonChunkSource {
    path: PathBuf,
    document: Document,
    chunks: Vec<Chunk>,
}

impl JsonChunkSource {
    pub fn open(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read chunk file {:?}", path))?;
        let file: DocumentFile = serde_json::from_str(&raw)
            .with_context(|| format!("failed to decode chunk file {:?}", path))?;

        let id = file
            .id
            .unwrap_or_else(|| document_id_for_source(&path.to_string_lossy()));
        let title = file.title.unwrap_or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("untitled")
                .to_string()
        });

        let mut chunks: Vec<Chunk> = file
            .chunks
            .into_iter()
            .enumerate()
            .map(|(position, record)| {
                let ordinal = record.ordinal.unwrap_or(position);
                Chunk {
                    id: record.id.unwrap_or_else(|| chunk_id_for(id, ordinal)),
                    document_id: id,
                    content: record.content,
                    page: record.page,
                    section: record.section,
                    ordinal,
                    keywords: record.keywords,
                }
            })
            .collect();
        chunks.sort_by_key(|chunk| chunk.ordinal);
        if let Some(pair) = chunks.windows(2).find(|pair| pair[0].ordinal == pair[1].ordinal) {
            return Err(anyhow!(
                "duplicate chunk ordinal {} in {:?}",
                pair[0].ordinal,
                path
            ));
        }

        Ok(Self {
            path: path.to_path_buf(),
            document: Document {
                id,
                title,
                total_pages: file.total_pages,
                source: file.source,
            },
            chunks,
        })
    }

    pub fn document_id(&self) -> DocumentId {
        self.document.id
    }
}

#[async_trait]
impl ChunkSource for JsonChunkSource {
    #[instrument(skip(self))]
    async fn document(&self, id: DocumentId) -> Result<Document> {
        if id != self.document.id {
            return Err(anyhow!("document {} not found in {:?}", id, self.path));
        }
        Ok(self.document.clone())
    }

    #[instrument(skip(self))]
    async fn chunks(&self, id: DocumentId) -> Result<Vec<Chunk>> {
        if id != self.document.id {
            return Err(anyhow!("document {} not found in {:?}", id, self.path));
        }
        Ok(self.chunks.clone())
    }
}

pub struct MemoryChunkSource {
    inner: Mutex<HashMap<DocumentId, (Document, Vec<Chunk>)>>,
}

impl MemoryChunkSource {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, document: Document, mut chunks: Vec<Chunk>) {
        chunks.sort_by_key(|chunk| chunk.ordinal);
        self.inner.lock().insert(document.id, (document, chunks));
    }
}

impl Default for MemoryChunkSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkSource for MemoryChunkSource {
    async fn document(&self, id: DocumentId) -> Result<Document> {
        self.inner
            .lock()
            .get(&id)
            .map(|(document, _)| document.clone())
            .ok_or_else(|| anyhow!("document {} not found", id))
    }

    async fn chunks(&self, id: DocumentId) -> Result<Vec<Chunk>> {
        self.inner
            .lock()
            .get(&id)
            .map(|(_, chunks)| chunks.clone())
            .ok_or_else(|| anyhow!("document {} not found", id))
    }
}

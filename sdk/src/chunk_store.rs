use dashmap::DashMap;
use query::{ChunkMetadata, ChunkTextStore};

/// In-memory chunk text/source lookup. Document loading, normalization and
/// chunking are out of scope here; callers populate this store directly
/// with whatever chunk ids their retrieval index already knows about. Since
/// this store never splits a document into sub-spans, every chunk's offsets
/// span its whole text.
#[derive(Default)]
pub struct InMemoryChunkStore {
    chunks: DashMap<String, (String, String)>,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, chunk_id: impl Into<String>, text: impl Into<String>, source: impl Into<String>) {
        self.chunks.insert(chunk_id.into(), (text.into(), source.into()));
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

impl ChunkTextStore for InMemoryChunkStore {
    fn get_text(&self, chunk_id: &str) -> Option<ChunkMetadata> {
        self.chunks.get(chunk_id).map(|entry| {
            let (text, source) = entry.value().clone();
            let end_offset = text.len();
            ChunkMetadata {
                text,
                source,
                start_offset: 0,
                end_offset,
            }
        })
    }
}

const CITATION_TEXT_MAX_CHARS: usize = 200;

/// Truncates to at most `max_chars` Unicode scalar values, not bytes.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Which collaborator produced the chunk ids behind a response: served from
/// the topic cache, reused from session history, or freshly searched out of
/// the ANN index. Drives which reranker handles the candidate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalSource {
    Cache,
    History,
    Ann,
}

impl RetrievalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalSource::Cache => "cache",
            RetrievalSource::History => "history",
            RetrievalSource::Ann => "ann",
        }
    }
}

/// What the metadata store hands back for a chunk id: text, source document,
/// and the byte span of the chunk within that source. The metadata store
/// itself (chunking, normalization) is an opaque out-of-scope collaborator;
/// this crate only ever sees this shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkMetadata {
    pub text: String,
    pub source: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// A chunk fetched from the metadata store by id, with its text and span
/// attached.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub text: String,
    pub source: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// A chunk with a reranker-assigned relevance score, 0.0-1.0 after sigmoid
/// normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedChunk {
    pub chunk: RetrievedChunk,
    pub score: f32,
}

/// A citation grounding part of an answer in a specific retrieved span.
/// `chunk_text` is truncated to 200 characters; the full text lives on the
/// chunk the citation was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct Citation {
    pub citation_id: u32,
    pub chunk_id: String,
    pub source: String,
    pub chunk_text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub relevance_score: f32,
}

impl Citation {
    pub fn from_ranked(citation_id: u32, ranked: &RankedChunk) -> Self {
        Self {
            citation_id,
            chunk_id: ranked.chunk.chunk_id.clone(),
            source: ranked.chunk.source.clone(),
            chunk_text: truncate_chars(&ranked.chunk.text, CITATION_TEXT_MAX_CHARS),
            start_offset: ranked.chunk.start_offset,
            end_offset: ranked.chunk.end_offset,
            relevance_score: ranked.score,
        }
    }
}

/// The orchestrator's terminal output. Stage failures fold into
/// `success: false` with a populated `error` and no `retrieval_source`. A
/// validation-exhausted query still reaches the worker and is reported as
/// `success: true`: the answer is whatever the worker produced (often its
/// own refusal wording), and citations are empty because the retrieved
/// chunks never cleared the relevance bar.
#[derive(Debug, Clone, PartialEq)]
pub struct RagResponse {
    pub query: String,
    pub success: bool,
    pub answer: Option<String>,
    pub citations: Vec<Citation>,
    pub retrieval_source: Option<RetrievalSource>,
    pub chunks_used: usize,
    pub retries_used: u32,
    pub error: Option<String>,
}

impl RagResponse {
    pub fn ok(
        query: String,
        answer: String,
        citations: Vec<Citation>,
        retrieval_source: RetrievalSource,
        chunks_used: usize,
        retries_used: u32,
    ) -> Self {
        Self {
            query,
            success: true,
            answer: Some(answer),
            citations,
            retrieval_source: Some(retrieval_source),
            chunks_used,
            retries_used,
            error: None,
        }
    }

    pub fn failed(query: String, error: impl std::fmt::Display) -> Self {
        Self {
            query,
            success: false,
            answer: None,
            citations: Vec::new(),
            retrieval_source: None,
            chunks_used: 0,
            retries_used: 0,
            error: Some(error.to_string()),
        }
    }
}

use crate::types::RankedChunk;
use alayasiki_core::embedding::{cosine_similarity, deterministic_embedding};
use std::future::Future;

const STOPWORDS: &[&str] = &["the", "a", "an", "is", "are", "of", "in", "on", "to", "what"];

fn keywords(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Hybrid keyword+embedding relevance check. Short queries (few keywords)
/// weight keyword overlap more heavily since there is little semantic
/// signal to lean on; longer queries weight the embedding more.
pub struct Validator {
    max_retries: u32,
    embed_model_id: String,
    embed_dims: usize,
}

impl Validator {
    pub fn new(max_retries: u32, embed_model_id: impl Into<String>, embed_dims: usize) -> Self {
        Self {
            max_retries,
            embed_model_id: embed_model_id.into(),
            embed_dims,
        }
    }

    fn weights(keyword_count: usize) -> (f32, f32) {
        if keyword_count <= 2 {
            (0.6, 0.4)
        } else {
            (0.4, 0.6)
        }
    }

    fn keyword_score(query_keywords: &[String], chunk_text: &str) -> f32 {
        if query_keywords.is_empty() {
            return 0.5;
        }
        let lower = chunk_text.to_lowercase();
        let hits = query_keywords.iter().filter(|kw| lower.contains(kw.as_str())).count();
        hits as f32 / query_keywords.len() as f32
    }

    fn combined_score(&self, query: &str, chunk: &RankedChunk) -> f32 {
        let kws = keywords(query);
        let (kw_weight, embed_weight) = Self::weights(kws.len());
        let kw_score = Self::keyword_score(&kws, &chunk.chunk.text);

        let query_embedding = deterministic_embedding(query, &self.embed_model_id, self.embed_dims);
        let chunk_embedding =
            deterministic_embedding(&chunk.chunk.text, &self.embed_model_id, self.embed_dims);
        let embed_score = (cosine_similarity(&query_embedding, &chunk_embedding) + 1.0) / 2.0;

        kw_weight * kw_score + embed_weight * embed_score
    }

    /// A set of chunks passes if at least one chunk clears `min_score`
    /// under the hybrid scoring above.
    pub fn passes(&self, query: &str, chunks: &[RankedChunk], min_score: f32) -> bool {
        chunks.iter().any(|c| self.combined_score(query, c) >= min_score)
    }

    fn rewrite_query(original: &str, attempt: u32) -> String {
        match attempt {
            1 => format!("What is {original}?"),
            _ => format!("detailed information about {original}"),
        }
    }

    /// Retries retrieval with a deterministically rewritten query until the
    /// result passes validation or `max_retries` is exhausted. `retrieve`
    /// performs a full retrieve-and-rerank pass for the given query text.
    pub async fn validate_with_retry<F, Fut>(
        &self,
        original_query: &str,
        initial_chunks: Vec<RankedChunk>,
        min_score: f32,
        mut retrieve: F,
    ) -> (Vec<RankedChunk>, u32)
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Vec<RankedChunk>>,
    {
        let mut chunks = initial_chunks;
        let mut retries_used = 0;

        while !self.passes(original_query, &chunks, min_score) && retries_used < self.max_retries {
            retries_used += 1;
            let rewritten = Self::rewrite_query(original_query, retries_used);
            chunks = retrieve(rewritten).await;
        }

        (chunks, retries_used)
    }
}

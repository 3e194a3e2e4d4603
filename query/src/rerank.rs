use crate::types::{RankedChunk, RetrievedChunk};
use alayasiki_core::embedding::{cosine_similarity, deterministic_embedding};

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Shared output contract: both rerankers produce sigmoid-or-cosine-derived
/// scores in `[0, 1]`, filter anything below `min_score`, then truncate to
/// `top_k`. Injected at construction time rather than lazily loaded, so a
/// missing model surfaces at startup instead of mid-request.
pub trait Reranker: Send + Sync {
    fn rerank(
        &self,
        query: &str,
        chunks: Vec<RetrievedChunk>,
        top_k: usize,
        min_score: f32,
    ) -> Vec<RankedChunk>;
}

fn finish(mut scored: Vec<RankedChunk>, top_k: usize, min_score: f32) -> Vec<RankedChunk> {
    scored.retain(|r| r.score >= min_score);
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
    scored.truncate(top_k);
    scored
}

/// Joint query+chunk scorer. The real model is an out-of-scope external
/// collaborator; this stands in with a deterministic embedding of the
/// concatenated pair, scaled and squashed through a sigmoid the same way
/// the original cross-encoder's logits were normalized.
pub struct CrossEncoderReranker {
    model_id: String,
    dims: usize,
    scale: f32,
}

impl CrossEncoderReranker {
    pub fn new(model_id: impl Into<String>, dims: usize, scale: f32) -> Self {
        Self {
            model_id: model_id.into(),
            dims,
            scale,
        }
    }
}

impl Reranker for CrossEncoderReranker {
    fn rerank(
        &self,
        query: &str,
        chunks: Vec<RetrievedChunk>,
        top_k: usize,
        min_score: f32,
    ) -> Vec<RankedChunk> {
        let query_embedding = deterministic_embedding(query, &self.model_id, self.dims);
        let scored = chunks
            .into_iter()
            .map(|chunk| {
                let pair_embedding =
                    deterministic_embedding(&chunk.text, &self.model_id, self.dims);
                let raw = cosine_similarity(&query_embedding, &pair_embedding) * self.scale;
                RankedChunk {
                    chunk,
                    score: sigmoid(raw),
                }
            })
            .collect();
        finish(scored, top_k, min_score)
    }
}

/// Bi-encoder fallback: scores each chunk against a precomputed query
/// embedding via cosine similarity, rescaled from `[-1, 1]` to `[0, 1]` so
/// its output sits on the same scale as the cross-encoder's.
pub struct LightweightReranker {
    model_id: String,
    dims: usize,
}

impl LightweightReranker {
    pub fn new(model_id: impl Into<String>, dims: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dims,
        }
    }
}

impl Reranker for LightweightReranker {
    fn rerank(
        &self,
        query: &str,
        chunks: Vec<RetrievedChunk>,
        top_k: usize,
        min_score: f32,
    ) -> Vec<RankedChunk> {
        let query_embedding = deterministic_embedding(query, &self.model_id, self.dims);
        let scored = chunks
            .into_iter()
            .map(|chunk| {
                let chunk_embedding = deterministic_embedding(&chunk.text, &self.model_id, self.dims);
                let cos = cosine_similarity(&query_embedding, &chunk_embedding);
                RankedChunk {
                    chunk,
                    score: (cos + 1.0) / 2.0,
                }
            })
            .collect();
        finish(scored, top_k, min_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: id.into(),
            text: text.into(),
            source: "doc".into(),
            start_offset: 0,
            end_offset: text.len(),
        }
    }

    #[test]
    fn cross_encoder_truncates_to_top_k_and_filters_min_score() {
        let reranker = CrossEncoderReranker::new("cross-v1", 32, 4.0);
        let chunks = vec![
            chunk("a", "rust ownership rules"),
            chunk("b", "completely unrelated cooking recipe"),
            chunk("c", "borrowing and ownership in rust"),
        ];
        let ranked = reranker.rerank("rust ownership", chunks, 1, 0.0);
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn lightweight_reranker_scores_stay_in_unit_range() {
        let reranker = LightweightReranker::new("bi-v1", 32);
        let chunks = vec![chunk("a", "rust ownership rules")];
        let ranked = reranker.rerank("rust ownership", chunks, 5, 0.0);
        assert_eq!(ranked.len(), 1);
        assert!(ranked[0].score >= 0.0 && ranked[0].score <= 1.0);
    }

    #[test]
    fn both_rerankers_produce_the_same_output_shape() {
        let cross = CrossEncoderReranker::new("cross-v1", 32, 4.0);
        let light = LightweightReranker::new("bi-v1", 32);
        let chunks = vec![chunk("a", "rust ownership rules")];

        let a = cross.rerank("rust ownership", chunks.clone(), 5, 0.0);
        let b = light.rerank("rust ownership", chunks, 5, 0.0);
        assert_eq!(a.len(), b.len());
    }
}

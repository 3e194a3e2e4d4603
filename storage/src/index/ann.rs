/// Black-box approximate-nearest-neighbour vector search, contracted but not
/// specified in detail: the core only ever calls `search` and never inspects
/// internal scores.
pub trait AnnIndex: Send + Sync {
    fn insert(&mut self, id: String, embedding: Vec<f32>);
    fn delete(&mut self, id: &str) -> bool;
    /// Top-k nearest neighbours by descending similarity.
    fn search(&self, query: &[f32], k: usize) -> Vec<String>;
}

use std::collections::HashMap;

/// Reference implementation: a simple linear cosine-similarity scan.
/// Placeholder for a real HNSW/IVF engine, which is out of scope.
#[derive(Default)]
pub struct LinearAnnIndex {
    embeddings: HashMap<String, Vec<f32>>,
}

impl LinearAnnIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    pub fn search_scored(&self, query: &[f32], k: usize) -> Vec<(String, f32)> {
        let mut scores: Vec<(String, f32)> = self
            .embeddings
            .iter()
            .filter_map(|(id, emb)| cosine_similarity(query, emb).map(|score| (id.clone(), score)))
            .collect();

        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scores.truncate(k);
        scores
    }
}

impl AnnIndex for LinearAnnIndex {
    fn insert(&mut self, id: String, embedding: Vec<f32>) {
        self.embeddings.insert(id, embedding);
    }

    fn delete(&mut self, id: &str) -> bool {
        self.embeddings.remove(id).is_some()
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<String> {
        self.search_scored(query, k)
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Some(0.0);
    }

    Some(dot / (norm_a * norm_b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_ann_search() {
        let mut index = LinearAnnIndex::new();

        index.insert("1".into(), vec![1.0, 0.0, 0.0]);
        index.insert("2".into(), vec![0.0, 1.0, 0.0]);
        index.insert("3".into(), vec![0.9, 0.1, 0.0]);

        let results = index.search(&[1.0, 0.0, 0.0], 2);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0], "1");
        assert_eq!(results[1], "3");
    }

    #[test]
    fn test_linear_ann_delete() {
        let mut index = LinearAnnIndex::new();
        index.insert("1".into(), vec![1.0, 0.0]);

        assert!(index.delete("1"));
        assert!(!index.delete("1"));
        assert!(index.is_empty());
    }
}

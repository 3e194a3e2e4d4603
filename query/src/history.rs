use alayasiki_core::config::HistoryConfig;
use alayasiki_core::embedding::cosine_similarity;
use alayasiki_core::model::TopicKey;
use storage::{HistoryRecord, HistoryStore, StorageError};

/// Bounded per-session semantic history: FIFO capacity eviction, TTL
/// eviction, cosine-similarity lookup over unit-norm query embeddings.
pub struct SessionHistory {
    config: HistoryConfig,
    store: HistoryStore,
}

impl SessionHistory {
    pub async fn open(
        path: impl AsRef<std::path::Path>,
        config: HistoryConfig,
    ) -> Result<Self, StorageError> {
        Ok(Self {
            store: HistoryStore::open(path).await?,
            config,
        })
    }

    /// Evicts stale rows for the session, then returns the most-recent
    /// remaining row (rows come back most-recent-first) whose cosine
    /// similarity clears the configured threshold. Stale eviction always
    /// runs first, matching the original ordering of expiring entries
    /// before considering them for reuse.
    pub async fn find_similar(
        &mut self,
        session_id: &str,
        query_embedding: &[f32],
        now: f64,
    ) -> Result<Option<(TopicKey, HistoryRecord)>, StorageError> {
        self.evict_stale(session_id, now).await?;

        let rows = self.store.load_for_session(session_id, self.config.max_size);
        for (key, record) in rows {
            let sim = cosine_similarity(query_embedding, &record.query_embedding);
            if sim >= self.config.sim_threshold {
                return Ok(Some((key, record)));
            }
        }

        Ok(None)
    }

    /// Upserts a history row, then enforces FIFO capacity by dropping the
    /// oldest entries for the session beyond `max_size`.
    pub async fn record(
        &mut self,
        session_id: &str,
        key: TopicKey,
        query_embedding: Vec<f32>,
        chunk_ids: Vec<String>,
        timestamp: f64,
    ) -> Result<(), StorageError> {
        self.store
            .upsert(session_id, key, query_embedding, chunk_ids, timestamp)
            .await?;

        let rows = self.store.load_for_session(session_id, usize::MAX);
        if rows.len() > self.config.max_size {
            for (key, _) in rows.into_iter().skip(self.config.max_size) {
                self.store.delete(session_id, &key).await?;
            }
        }

        Ok(())
    }

    /// Normalized prior query text (the topic label doubles as one, see
    /// `QueryRouter`) paired with its embedding, most-recent first. Used by
    /// `QueryPreprocessor` to resolve follow-up references.
    pub fn prior_queries(&self, session_id: &str) -> Vec<(String, Vec<f32>)> {
        self.store
            .load_for_session(session_id, self.config.max_size)
            .into_iter()
            .map(|(key, record)| (key.topic_label, record.query_embedding))
            .collect()
    }

    async fn evict_stale(&mut self, session_id: &str, now: f64) -> Result<(), StorageError> {
        let rows = self.store.load_for_session(session_id, usize::MAX);
        for (key, record) in rows {
            if now - record.timestamp > self.config.max_age_s as f64 {
                self.store.delete(session_id, &key).await?;
            }
        }
        Ok(())
    }
}

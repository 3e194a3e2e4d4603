use crate::error::StorageError;
use crate::wal::Wal;
use alayasiki_core::model::{HistoryRow, TopicKey};
use dashmap::DashMap;
use std::path::Path;

type HistoryKey = (String, TopicKey);

#[derive(Clone, Debug, PartialEq)]
pub struct HistoryRecord {
    pub query_embedding: Vec<f32>,
    pub chunk_ids: Vec<String>,
    pub timestamp: f64,
}

/// Durable, keyed mirror of session-history entries, keyed by
/// `(session_id, topic_key)` as required by §6.
pub struct HistoryStore {
    wal: Wal,
    materialized: DashMap<HistoryKey, HistoryRecord>,
}

impl HistoryStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let mut wal = Wal::open(path).await?;
        let materialized: DashMap<HistoryKey, HistoryRecord> = DashMap::new();

        wal.replay(|_lsn, payload| {
            let row: HistoryRow = rkyv::from_bytes(&payload)
                .map_err(|_| crate::wal::WalError::CorruptEntry)?;
            match row {
                HistoryRow::Upsert {
                    session_id,
                    key,
                    query_embedding,
                    chunk_ids,
                    timestamp,
                } => {
                    materialized.insert(
                        (session_id, key),
                        HistoryRecord {
                            query_embedding,
                            chunk_ids,
                            timestamp,
                        },
                    );
                }
                HistoryRow::Tombstone { session_id, key } => {
                    materialized.remove(&(session_id, key));
                }
            }
            Ok(())
        })
        .await?;

        Ok(Self { wal, materialized })
    }

    pub async fn upsert(
        &mut self,
        session_id: &str,
        key: TopicKey,
        query_embedding: Vec<f32>,
        chunk_ids: Vec<String>,
        timestamp: f64,
    ) -> Result<(), StorageError> {
        let row = HistoryRow::Upsert {
            session_id: session_id.to_string(),
            key: key.clone(),
            query_embedding: query_embedding.clone(),
            chunk_ids: chunk_ids.clone(),
            timestamp,
        };
        let bytes = rkyv::to_bytes::<_, 256>(&row)
            .map_err(|_| StorageError::CorruptRow("failed to encode history row".into()))?;
        self.wal.append(&bytes).await?;
        self.wal.flush().await?;
        self.materialized.insert(
            (session_id.to_string(), key),
            HistoryRecord {
                query_embedding,
                chunk_ids,
                timestamp,
            },
        );
        Ok(())
    }

    pub async fn delete(&mut self, session_id: &str, key: &TopicKey) -> Result<(), StorageError> {
        let row = HistoryRow::Tombstone {
            session_id: session_id.to_string(),
            key: key.clone(),
        };
        let bytes = rkyv::to_bytes::<_, 256>(&row)
            .map_err(|_| StorageError::CorruptRow("failed to encode tombstone".into()))?;
        self.wal.append(&bytes).await?;
        self.wal.flush().await?;
        self.materialized.remove(&(session_id.to_string(), key.clone()));
        Ok(())
    }

    /// Entries for a session, most-recent first, truncated to `max_size`
    /// as required by the load-on-construction contract (§4.2).
    pub fn load_for_session(&self, session_id: &str, max_size: usize) -> Vec<(TopicKey, HistoryRecord)> {
        let mut rows: Vec<(TopicKey, HistoryRecord)> = self
            .materialized
            .iter()
            .filter(|r| r.key().0 == session_id)
            .map(|r| (r.key().1.clone(), r.value().clone()))
            .collect();
        rows.sort_by(|a, b| b.1.timestamp.partial_cmp(&a.1.timestamp).unwrap());
        rows.truncate(max_size);
        rows
    }
}

use crate::error::StorageError;
use crate::wal::Wal;
use alayasiki_core::model::{CacheLevel, CacheRow, TopicKey, TopicState};
use dashmap::DashMap;
use std::path::Path;

/// Durable, keyed mirror of the three cache tiers. Every mutation is
/// synchronously appended to the WAL; the in-memory materialized view is
/// rebuilt from the log on open and kept in lockstep thereafter, so the two
/// never diverge within a single process.
pub struct CacheStore {
    wal: Wal,
    materialized: DashMap<TopicKey, (TopicState, CacheLevel)>,
}

impl CacheStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let mut wal = Wal::open(path).await?;
        let materialized: DashMap<TopicKey, (TopicState, CacheLevel)> = DashMap::new();

        wal.replay(|_lsn, payload| {
            let row: CacheRow = rkyv::from_bytes(&payload)
                .map_err(|_| crate::wal::WalError::CorruptEntry)?;
            match row {
                CacheRow::Upsert { key, state, level } => {
                    materialized.insert(key, (state, level));
                }
                CacheRow::Tombstone { key } => {
                    materialized.remove(&key);
                }
            }
            Ok(())
        })
        .await?;

        Ok(Self { wal, materialized })
    }

    pub async fn upsert(
        &mut self,
        key: TopicKey,
        state: TopicState,
        level: CacheLevel,
    ) -> Result<(), StorageError> {
        let row = CacheRow::Upsert {
            key: key.clone(),
            state: state.clone(),
            level,
        };
        let bytes = rkyv::to_bytes::<_, 256>(&row)
            .map_err(|_| StorageError::CorruptRow("failed to encode cache row".into()))?;
        self.wal.append(&bytes).await?;
        self.wal.flush().await?;
        self.materialized.insert(key, (state, level));
        Ok(())
    }

    pub async fn delete(&mut self, key: &TopicKey) -> Result<(), StorageError> {
        let row = CacheRow::Tombstone { key: key.clone() };
        let bytes = rkyv::to_bytes::<_, 256>(&row)
            .map_err(|_| StorageError::CorruptRow("failed to encode tombstone".into()))?;
        self.wal.append(&bytes).await?;
        self.wal.flush().await?;
        self.materialized.remove(key);
        Ok(())
    }

    pub fn get(&self, key: &TopicKey) -> Option<(TopicState, CacheLevel)> {
        self.materialized.get(key).map(|r| r.value().clone())
    }

    /// All live rows, ordered by `last_access_ts` ascending (most-recent last),
    /// matching the load-on-start ordering required by the cache (§4.1).
    pub fn load_all(&self) -> Vec<(TopicKey, TopicState, CacheLevel)> {
        let mut rows: Vec<(TopicKey, TopicState, CacheLevel)> = self
            .materialized
            .iter()
            .map(|r| {
                let (key, (state, level)) = r.pair();
                (key.clone(), state.clone(), *level)
            })
            .collect();
        rows.sort_by(|a, b| a.1.last_access_ts.partial_cmp(&b.1.last_access_ts).unwrap());
        rows
    }

    pub fn len(&self) -> usize {
        self.materialized.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materialized.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn key(label: &str) -> TopicKey {
        TopicKey::new(label, "any", "default")
    }

    #[tokio::test]
    async fn upsert_then_reopen_restores_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.wal");

        {
            let mut store = CacheStore::open(&path).await.unwrap();
            store
                .upsert(
                    key("rust ownership"),
                    TopicState::new(vec!["c1".into(), "c2".into()], 1.0),
                    CacheLevel::L3,
                )
                .await
                .unwrap();
        }

        let store = CacheStore::open(&path).await.unwrap();
        assert_eq!(store.len(), 1);
        let (state, level) = store.get(&key("rust ownership")).unwrap();
        assert_eq!(state.cached_chunk_ids, vec!["c1", "c2"]);
        assert_eq!(level, CacheLevel::L3);
    }

    #[tokio::test]
    async fn delete_removes_row_durably() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.wal");

        let mut store = CacheStore::open(&path).await.unwrap();
        store
            .upsert(
                key("topic a"),
                TopicState::new(vec!["c1".into()], 1.0),
                CacheLevel::L3,
            )
            .await
            .unwrap();
        store.delete(&key("topic a")).await.unwrap();
        drop(store);

        let store = CacheStore::open(&path).await.unwrap();
        assert!(store.is_empty());
    }
}

use alayasiki_core::config::CacheConfig;
use alayasiki_core::model::{CacheLevel, TopicKey, TopicState};
use std::collections::{HashMap, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};
use storage::CacheStore;
use storage::StorageError;

fn now_ts() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs_f64()
}

/// Three-tier (L1 hot / L2 warm / L3 cold) topic cache with access-count
/// promotion and capacity-triggered demotion/eviction, backed by a durable
/// keyed store. Every tier is an ordered queue: front is least-recent, back
/// is most-recent.
pub struct TopicCache {
    config: CacheConfig,
    store: CacheStore,
    l1: VecDeque<TopicKey>,
    l2: VecDeque<TopicKey>,
    l3: VecDeque<TopicKey>,
    directory: HashMap<TopicKey, TopicState>,
    levels: HashMap<TopicKey, CacheLevel>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugCounts {
    pub l1: usize,
    pub l2: usize,
    pub l3: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugLevels {
    pub l1: Vec<TopicKey>,
    pub l2: Vec<TopicKey>,
    pub l3: Vec<TopicKey>,
}

impl TopicCache {
    pub async fn open(
        path: impl AsRef<std::path::Path>,
        config: CacheConfig,
    ) -> Result<Self, StorageError> {
        assert!(
            config.l1_capacity > 0 && config.l2_capacity > 0 && config.l3_capacity > 0,
            "cache tier capacities must be non-zero"
        );

        let store = CacheStore::open(path).await?;
        let mut cache = Self {
            config,
            store,
            l1: VecDeque::new(),
            l2: VecDeque::new(),
            l3: VecDeque::new(),
            directory: HashMap::new(),
            levels: HashMap::new(),
        };

        // Rows come back ordered by last_access_ts ascending, so pushing to
        // the back of each tier in that order reproduces recency order.
        for (key, state, level) in cache.store.load_all() {
            cache.tier_mut(level).push_back(key.clone());
            cache.levels.insert(key.clone(), level);
            cache.directory.insert(key, state);
        }

        Ok(cache)
    }

    fn tier_mut(&mut self, level: CacheLevel) -> &mut VecDeque<TopicKey> {
        match level {
            CacheLevel::L1 => &mut self.l1,
            CacheLevel::L2 => &mut self.l2,
            CacheLevel::L3 => &mut self.l3,
        }
    }

    fn capacity(&self, level: CacheLevel) -> usize {
        match level {
            CacheLevel::L1 => self.config.l1_capacity,
            CacheLevel::L2 => self.config.l2_capacity,
            CacheLevel::L3 => self.config.l3_capacity,
        }
    }

    /// Returns the current state if present, updating access statistics and
    /// possibly promoting the node. `None` on miss, no side effects on miss.
    /// A failed durable write leaves in-memory state untouched: the new
    /// state is persisted before any tier/directory mutation is applied.
    pub async fn lookup(&mut self, key: &TopicKey) -> Result<Option<TopicState>, StorageError> {
        let Some(level) = self.levels.get(key).copied() else {
            return Ok(None);
        };

        let mut new_state = self.directory.get(key).expect("directory/levels out of sync").clone();
        new_state.record_access(now_ts());

        let new_level = match level {
            CacheLevel::L3 if new_state.access_count >= self.config.l3_threshold => CacheLevel::L2,
            CacheLevel::L2 if new_state.access_count >= self.config.l2_threshold => CacheLevel::L1,
            other => other,
        };

        self.store.upsert(key.clone(), new_state.clone(), new_level).await?;

        self.directory.insert(key.clone(), new_state.clone());

        // Move to the back of its current tier.
        let tier = self.tier_mut(level);
        if let Some(pos) = tier.iter().position(|k| k == key) {
            tier.remove(pos);
        }
        self.tier_mut(level).push_back(key.clone());

        if new_level != level {
            let tier = self.tier_mut(level);
            if let Some(pos) = tier.iter().position(|k| k == key) {
                tier.remove(pos);
            }
            self.tier_mut(new_level).push_back(key.clone());
            self.levels.insert(key.clone(), new_level);
        }

        self.enforce_overflow().await?;

        Ok(Some(new_state))
    }

    /// If `key` exists, returns its current state unchanged (idempotent on
    /// racing inserts). Otherwise inserts a fresh node into L3 and returns
    /// the new state.
    pub async fn insert_new(
        &mut self,
        key: TopicKey,
        cached_chunk_ids: Vec<String>,
    ) -> Result<TopicState, StorageError> {
        if let Some(existing) = self.directory.get(&key) {
            return Ok(existing.clone());
        }

        let state = TopicState::new(cached_chunk_ids, now_ts());
        self.store.upsert(key.clone(), state.clone(), CacheLevel::L3).await?;

        self.l3.push_back(key.clone());
        self.levels.insert(key.clone(), CacheLevel::L3);
        self.directory.insert(key, state.clone());

        self.enforce_overflow().await?;

        Ok(state)
    }

    /// Demotes/evicts down the tier ladder. Each step persists the row's new
    /// location (or its tombstone) before mutating in-memory tiers, so a
    /// failed durable write rolls the in-memory side back to its pre-call
    /// shape by simply not having happened yet.
    async fn enforce_overflow(&mut self) -> Result<(), StorageError> {
        if self.l1.len() > self.capacity(CacheLevel::L1) {
            if let Some(key) = self.l1.front().cloned() {
                let state = self.directory.get(&key).unwrap().clone();
                self.store.upsert(key.clone(), state, CacheLevel::L2).await?;
                self.l1.pop_front();
                self.l2.push_back(key.clone());
                self.levels.insert(key, CacheLevel::L2);
            }
        }

        if self.l2.len() > self.capacity(CacheLevel::L2) {
            if let Some(key) = self.l2.front().cloned() {
                let state = self.directory.get(&key).unwrap().clone();
                self.store.upsert(key.clone(), state, CacheLevel::L3).await?;
                self.l2.pop_front();
                self.l3.push_back(key.clone());
                self.levels.insert(key, CacheLevel::L3);
            }
        }

        if self.l3.len() > self.capacity(CacheLevel::L3) {
            if let Some(key) = self.l3.front().cloned() {
                self.store.delete(&key).await?;
                self.l3.pop_front();
                self.levels.remove(&key);
                self.directory.remove(&key);
                tracing::debug!(topic_label = %key.topic_label, "evicted cold cache entry");
            }
        }

        Ok(())
    }

    pub fn debug_counts(&self) -> DebugCounts {
        DebugCounts {
            l1: self.l1.len(),
            l2: self.l2.len(),
            l3: self.l3.len(),
        }
    }

    pub fn debug_dump_levels(&self) -> DebugLevels {
        DebugLevels {
            l1: self.l1.iter().cloned().collect(),
            l2: self.l2.iter().cloned().collect(),
            l3: self.l3.iter().cloned().collect(),
        }
    }
}

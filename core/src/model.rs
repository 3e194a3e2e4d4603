use rkyv::{Archive, Deserialize, Serialize};

/// Normalized, modality-tagged identifier for a query class. Used as the
/// cache/history primary key. `user_scope` folds per-user scoping into the
/// key itself rather than through a silent adapter layer (see DESIGN.md's
/// notes on the dropped `_UserCacheAdapter`).
#[derive(Archive, Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Hash)]
#[archive(check_bytes)]
pub struct TopicKey {
    pub topic_label: String,
    pub modality_filter: String,
    pub retrieval_policy: String,
    pub user_scope: Option<String>,
}

impl TopicKey {
    pub fn new(
        topic_label: impl Into<String>,
        modality_filter: impl Into<String>,
        retrieval_policy: impl Into<String>,
    ) -> Self {
        Self {
            topic_label: topic_label.into(),
            modality_filter: modality_filter.into(),
            retrieval_policy: retrieval_policy.into(),
            user_scope: None,
        }
    }

    pub fn with_user_scope(mut self, user_scope: impl Into<String>) -> Self {
        self.user_scope = Some(user_scope.into());
        self
    }
}

/// Runtime state owned by exactly one cache entry.
#[derive(Archive, Deserialize, Serialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub struct TopicState {
    pub cached_chunk_ids: Vec<String>,
    pub access_count: u32,
    pub last_access_ts: f64,
    pub first_seen_ts: f64,
    pub score: f32,
    pub confidence: f32,
}

impl TopicState {
    pub fn new(cached_chunk_ids: Vec<String>, now: f64) -> Self {
        Self {
            cached_chunk_ids,
            access_count: 1,
            last_access_ts: now,
            first_seen_ts: now,
            score: 1.1,
            confidence: 0.0,
        }
    }

    pub fn record_access(&mut self, now: f64) {
        self.access_count += 1;
        self.last_access_ts = now;
        self.score = self.access_count as f32 + 0.1;
    }
}

/// Tier a cache node is indexed in.
#[derive(Archive, Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[archive(check_bytes)]
pub enum CacheLevel {
    L1,
    L2,
    L3,
}

/// Durable representation of one cache entry. Persisted via the WAL-backed
/// `CacheStore`; `Tombstone` records an eviction so replay can reconstruct
/// the live set from the log alone.
#[derive(Archive, Deserialize, Serialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub enum CacheRow {
    Upsert {
        key: TopicKey,
        state: TopicState,
        level: CacheLevel,
    },
    Tombstone {
        key: TopicKey,
    },
}

/// Durable representation of one session-history entry.
#[derive(Archive, Deserialize, Serialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub enum HistoryRow {
    Upsert {
        session_id: String,
        key: TopicKey,
        query_embedding: Vec<f32>,
        chunk_ids: Vec<String>,
        timestamp: f64,
    },
    Tombstone {
        session_id: String,
        key: TopicKey,
    },
}

/// One turn of a conversation, as kept by `ConversationMemory`.
#[derive(Archive, Deserialize, Serialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub struct ConversationTurn {
    pub query: String,
    pub response: String,
    pub timestamp: f64,
}

/// Durable representation of one conversation turn, keyed by `session_id`
/// plus an ordinal sequence number so replay preserves turn order.
#[derive(Archive, Deserialize, Serialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub enum ConversationRow {
    Append {
        session_id: String,
        seq: u64,
        turn: ConversationTurn,
    },
    ClearSession {
        session_id: String,
    },
}

use alayasiki_core::config::ConversationConfig;
use alayasiki_core::model::ConversationTurn;
use storage::{ConversationStore, StorageError};

/// Bounded per-session turn ring. Trims to `max_turns` on every append, the
/// same way the original SQLite-backed memory trimmed at `max_turns * 2`
/// rows (query+response pairs) kept as separate rows there; here each turn
/// is one row, so the cap applies directly.
pub struct ConversationMemory {
    config: ConversationConfig,
    store: ConversationStore,
}

impl ConversationMemory {
    pub async fn open(
        path: impl AsRef<std::path::Path>,
        config: ConversationConfig,
    ) -> Result<Self, StorageError> {
        Ok(Self {
            store: ConversationStore::open(path).await?,
            config,
        })
    }

    pub async fn add_turn(
        &mut self,
        session_id: &str,
        query: String,
        response: String,
        timestamp: f64,
    ) -> Result<(), StorageError> {
        self.store
            .append(
                session_id,
                ConversationTurn {
                    query,
                    response,
                    timestamp,
                },
            )
            .await?;
        self.store.trim(session_id, self.config.max_turns);
        Ok(())
    }

    /// All turns for the session, oldest first, suitable for building a
    /// prompt's prior-turn context.
    pub fn get_context(&self, session_id: &str) -> Vec<ConversationTurn> {
        self.store.turns(session_id)
    }

    /// The `n` most recent queries, most recent last.
    pub fn get_recent_queries(&self, session_id: &str, n: usize) -> Vec<String> {
        let turns = self.store.turns(session_id);
        let start = turns.len().saturating_sub(n);
        turns[start..].iter().map(|t| t.query.clone()).collect()
    }

    pub async fn clear_session(&mut self, session_id: &str) -> Result<(), StorageError> {
        self.store.clear_session(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config() -> ConversationConfig {
        ConversationConfig { max_turns: 3 }
    }

    #[tokio::test]
    async fn add_turn_trims_to_max_turns() {
        let dir = tempdir().unwrap();
        let mut memory = ConversationMemory::open(dir.path().join("m.wal"), config())
            .await
            .unwrap();

        for i in 0..5 {
            memory
                .add_turn("s1", format!("q{i}"), format!("r{i}"), i as f64)
                .await
                .unwrap();
        }

        let context = memory.get_context("s1");
        assert_eq!(context.len(), 3);
        assert_eq!(context[0].query, "q2");
        assert_eq!(context[2].query, "q4");
    }

    #[tokio::test]
    async fn get_recent_queries_returns_most_recent_last() {
        let dir = tempdir().unwrap();
        let mut memory = ConversationMemory::open(dir.path().join("m.wal"), config())
            .await
            .unwrap();

        memory.add_turn("s1", "q0".into(), "r0".into(), 0.0).await.unwrap();
        memory.add_turn("s1", "q1".into(), "r1".into(), 1.0).await.unwrap();

        let recent = memory.get_recent_queries("s1", 1);
        assert_eq!(recent, vec!["q1".to_string()]);
    }

    #[tokio::test]
    async fn clear_session_empties_context() {
        let dir = tempdir().unwrap();
        let mut memory = ConversationMemory::open(dir.path().join("m.wal"), config())
            .await
            .unwrap();

        memory.add_turn("s1", "q0".into(), "r0".into(), 0.0).await.unwrap();
        memory.clear_session("s1").await.unwrap();
        assert!(memory.get_context("s1").is_empty());
    }
}

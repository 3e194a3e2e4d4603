pub mod chunk_store;
pub mod error;

pub use chunk_store::InMemoryChunkStore;
pub use error::SdkError;

use alayasiki_core::config::RagConfig;
use query::{
    ChunkTextStore, ConversationMemory, CrossEncoderReranker, LightweightReranker, QueryPreprocessor,
    QueryRouter, RagResponse, RetrievalOrchestrator, SessionHistory, TopicCache, Validator,
};
use slm::GeneratorWorker;
use std::path::Path;
use std::sync::Arc;
use storage::{AnnIndex, LinearAnnIndex};
use tracing::info;

const EMBED_MODEL_ID: &str = "embedding-default-v1";
const RERANKER_SCALE: f32 = 4.0;

/// Top-level facade wiring configuration, durable stores, the retrieval
/// orchestrator and the generator worker into one handle. Callers seed the
/// ANN index and chunk store themselves (document ingestion is out of
/// scope) and then drive everything through `ask`.
pub struct RagSystem {
    orchestrator: RetrievalOrchestrator,
    generator: Arc<GeneratorWorker>,
    chunk_store: Arc<InMemoryChunkStore>,
}

impl RagSystem {
    pub async fn open(
        config: RagConfig,
        chunk_store: Arc<InMemoryChunkStore>,
    ) -> Result<Self, SdkError> {
        let data_dir = Path::new(&config.storage.data_dir);
        info!(data_dir = %data_dir.display(), "opening rag system");
        tokio::fs::create_dir_all(data_dir)
            .await
            .map_err(|e| SdkError::DataDir(e.to_string()))?;

        let cache = TopicCache::open(data_dir.join("cache.wal"), config.cache.clone()).await?;
        let history =
            SessionHistory::open(data_dir.join("history.wal"), config.history.clone()).await?;
        let conversation = ConversationMemory::open(
            data_dir.join("conversation.wal"),
            config.conversation.clone(),
        )
        .await?;

        let generator = Arc::new(GeneratorWorker::new(
            config.generator.worker_path.clone(),
            config.generator.model_path.clone(),
            config.generator.ipc_timeout_s,
            config.generator.shutdown_grace_s,
        ));

        let cross_encoder_reranker = Box::new(CrossEncoderReranker::new(
            EMBED_MODEL_ID,
            config.retrieval.embed_dim,
            RERANKER_SCALE,
        ));
        let lightweight_reranker = Box::new(LightweightReranker::new(
            EMBED_MODEL_ID,
            config.retrieval.embed_dim,
        ));
        let validator = Validator::new(
            config.retrieval.max_retries,
            EMBED_MODEL_ID,
            config.retrieval.embed_dim,
        );

        let orchestrator = RetrievalOrchestrator::new(
            config.retrieval.clone(),
            cache,
            history,
            conversation,
            QueryRouter::new(),
            QueryPreprocessor::new(),
            Box::new(LinearAnnIndex::new()),
            chunk_store.clone() as Arc<dyn ChunkTextStore>,
            cross_encoder_reranker,
            lightweight_reranker,
            validator,
            Box::new(generator.clone()),
        );

        Ok(Self {
            orchestrator,
            generator,
            chunk_store,
        })
    }

    /// Loads configuration from `config/default.{toml,yaml,...}`,
    /// `config/{RUN_MODE}.*` and `RAG__`-prefixed environment overrides,
    /// then opens the system against it.
    pub async fn open_with_default_config(
        chunk_store: Arc<InMemoryChunkStore>,
    ) -> Result<Self, SdkError> {
        let config = RagConfig::load()?;
        Self::open(config, chunk_store).await
    }

    pub async fn ask(&mut self, session_id: &str, raw_query: &str) -> RagResponse {
        self.orchestrator.handle_query(session_id, raw_query).await
    }

    /// Registers a chunk's embedding in the ANN index and its text/source
    /// in the chunk store, so later queries can retrieve it.
    pub fn index_chunk(
        &mut self,
        chunk_id: impl Into<String>,
        embedding: Vec<f32>,
        text: impl Into<String>,
        source: impl Into<String>,
    ) {
        let chunk_id = chunk_id.into();
        self.orchestrator
            .index_mut()
            .insert(chunk_id.clone(), embedding);
        self.chunk_store.insert(chunk_id, text, source);
    }

    pub fn chunk_store(&self) -> Arc<InMemoryChunkStore> {
        self.chunk_store.clone()
    }

    /// Sends SIGTERM (then SIGKILL after the configured grace period) to
    /// the generator worker subprocess, if one was ever spawned.
    pub async fn shutdown(&self) {
        self.generator.shutdown().await;
    }
}

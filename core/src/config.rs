use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub l1_capacity: usize,
    pub l2_capacity: usize,
    pub l3_capacity: usize,
    pub l2_threshold: u32,
    pub l3_threshold: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_capacity: 32,
            l2_capacity: 128,
            l3_capacity: 1024,
            l2_threshold: 8,
            l3_threshold: 3,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    pub max_size: usize,
    pub max_age_s: u64,
    pub sim_threshold: f32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_size: 32,
            max_age_s: 3600,
            sim_threshold: 0.80,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    pub ann_top_k: usize,
    pub rerank_top_k: usize,
    pub min_relevance_score: f32,
    pub max_retries: u32,
    pub embed_dim: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            ann_top_k: 5,
            rerank_top_k: 5,
            min_relevance_score: 0.15,
            max_retries: 2,
            embed_dim: 384,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneratorConfig {
    pub worker_path: String,
    pub model_path: String,
    pub ipc_timeout_s: u64,
    pub shutdown_grace_s: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            worker_path: "bin/llm_worker".into(),
            model_path: "models/model.gguf".into(),
            ipc_timeout_s: 120,
            shutdown_grace_s: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConversationConfig {
    pub max_turns: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self { max_turns: 20 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub data_dir: String,
    pub wal_flush_interval_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".into(),
            wal_flush_interval_ms: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RagConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
}

impl RagConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(Environment::with_prefix("RAG").separator("__"));

        builder.build()?.try_deserialize()
    }
}

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration. Constructed once (defaults or environment) and
/// passed by reference into each component; library code never reads the
/// environment itself.
#[derive(Debug, Clone)]
pub struct Config {
    /// Where cloned repos, the vector store, and the session db live.
    pub data_dir: PathBuf,
    /// LLM provider configuration (chat + embeddings).
    pub llm: LlmConfig,
    /// Cross-encoder reranker sidecar configuration.
    pub reranker: RerankerConfig,
    /// Retrieval pipeline tuning.
    pub retrieval: RetrievalConfig,
    /// Chunk splitting tuning.
    pub chunking: ChunkingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for chat
    pub chat_model: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
}

/// Configuration for the cross-encoder reranker sidecar
/// (e.g. llama-server with a Qwen3-Reranker model).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// Base URL for the rerank API (e.g. "http://127.0.0.1:8082").
    /// If None, re-ranking is a passthrough over the fused order.
    pub base_url: Option<String>,
    /// Model name to send in the rerank request.
    pub model: Option<String>,
    /// Request timeout in seconds (capped at 30).
    pub timeout_secs: u64,
}

/// Tuning for the hybrid retrieval pipeline. All fields have documented
/// defaults; none are load-bearing constants.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// RRF damping constant k in 1/(k + rank).
    pub rrf_k: f32,
    /// Fused candidate pool size. Must be >= final_k and >= the reranker's
    /// input size (the pool doubles as the rerank budget M).
    pub fused_pool_size: usize,
    /// Final result count K returned by retrieve().
    pub final_k: usize,
    /// Whether the cross-encoder re-ranking stage runs.
    pub rerank_enabled: bool,
    /// Results kept after re-ranking.
    pub rerank_top_n: usize,
    /// Whether vector search applies MMR diversity selection.
    pub mmr_enabled: bool,
    /// MMR relevance/diversity balance; 1.0 = pure relevance.
    pub mmr_lambda: f32,
    /// MMR oversampling: pool size = multiple * limit.
    pub mmr_fetch_multiple: usize,
}

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Maximum non-whitespace characters per chunk window.
    pub chunk_size: usize,
    /// Characters of the file head prepended to each chunk's embed text.
    pub header_preview_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            llm: LlmConfig::default(),
            reranker: RerankerConfig::default(),
            retrieval: RetrievalConfig::default(),
            chunking: ChunkingConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            chat_model: "qwen2.5-coder:7b".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            api_key: None,
        }
    }
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model: None,
            timeout_secs: 10,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            fused_pool_size: 30,
            final_k: 6,
            rerank_enabled: false,
            rerank_top_n: 4,
            mmr_enabled: true,
            mmr_lambda: 0.5,
            mmr_fetch_multiple: 4,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1500,
            header_preview_chars: 400,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("CODERAG_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider.to_lowercase();
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Ok(model) = std::env::var("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.llm.api_key = Some(key);
        }

        if let Ok(url) = std::env::var("RERANKER_BASE_URL") {
            config.reranker.base_url = Some(url);
            config.retrieval.rerank_enabled = true;
        }
        if let Ok(model) = std::env::var("RERANKER_MODEL") {
            config.reranker.model = Some(model);
        }
        if let Ok(val) = std::env::var("RERANKER_TIMEOUT_SECS") {
            if let Ok(v) = val.parse::<u64>() {
                config.reranker.timeout_secs = v.min(30);
            }
        }

        if let Ok(val) = std::env::var("CODERAG_RRF_K") {
            if let Ok(v) = val.parse() {
                config.retrieval.rrf_k = v;
            }
        }
        if let Ok(val) = std::env::var("CODERAG_POOL_SIZE") {
            if let Ok(v) = val.parse() {
                config.retrieval.fused_pool_size = v;
            }
        }
        if let Ok(val) = std::env::var("CODERAG_FINAL_K") {
            if let Ok(v) = val.parse() {
                config.retrieval.final_k = v;
            }
        }
        if let Ok(val) = std::env::var("CODERAG_RERANK_TOP_N") {
            if let Ok(v) = val.parse() {
                config.retrieval.rerank_top_n = v;
            }
        }
        if let Ok(val) = std::env::var("CODERAG_MMR_ENABLED") {
            if let Ok(v) = val.parse() {
                config.retrieval.mmr_enabled = v;
            }
        }
        if let Ok(val) = std::env::var("CODERAG_MMR_LAMBDA") {
            if let Ok(v) = val.parse::<f32>() {
                config.retrieval.mmr_lambda = v.clamp(0.0, 1.0);
            }
        }
        if let Ok(val) = std::env::var("CODERAG_CHUNK_SIZE") {
            if let Ok(v) = val.parse() {
                config.chunking.chunk_size = v;
            }
        }

        // The fused pool feeds both the final cut and the rerank budget.
        config.retrieval.fused_pool_size = config
            .retrieval
            .fused_pool_size
            .max(config.retrieval.final_k)
            .max(config.retrieval.rerank_top_n);

        config
    }

    pub fn repos_dir(&self) -> PathBuf {
        self.data_dir.join("repos")
    }

    pub fn vector_store_path(&self) -> PathBuf {
        self.data_dir.join("vectors.json")
    }

    pub fn workspace_db_path(&self) -> PathBuf {
        self.data_dir.join("workspaces.db")
    }
}

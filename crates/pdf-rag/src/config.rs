//! Configuration for the PDF RAG service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable naming a TOML config file
pub const CONFIG_PATH_ENV: &str = "PDF_RAG_CONFIG";

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Ollama/LLM configuration
    pub llm: LlmConfig,
    /// Embedding configuration
    pub embeddings: EmbeddingConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Vector index configuration
    pub vector_db: VectorDbConfig,
    /// Retrieval tool configuration
    pub retrieval: RetrievalConfig,
    /// Conversation engine configuration
    pub conversation: ConversationConfig,
    /// Upload handling
    pub ingestion: IngestionConfig,
}

impl RagConfig {
    /// Load configuration from a TOML file. Missing sections fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&raw)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: RagConfig = toml::from_str(raw)
            .map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from the environment.
    ///
    /// Reads the file named by `PDF_RAG_CONFIG` when set, then applies
    /// `OLLAMA_BASE_URL`, `PDF_RAG_HOST` and `PDF_RAG_PORT` overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load(path)?,
            Err(_) => Self::default(),
        };

        if let Ok(url) = std::env::var("OLLAMA_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(host) = std::env::var("PDF_RAG_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("PDF_RAG_PORT") {
            config.server.port = port
                .parse()
                .map_err(|e| Error::Config(format!("Invalid PDF_RAG_PORT '{}': {}", port, e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.top_k == 0 {
            return Err(Error::Config("retrieval.top_k must be at least 1".to_string()));
        }
        if self.chunking.chunk_size == 0 {
            return Err(Error::Config("chunking.chunk_size must be positive".to_string()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::Config(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.vector_db.collection.trim().is_empty() {
            return Err(Error::Config("vector_db.collection must not be empty".to_string()));
        }
        if self.conversation.default_thread_id.trim().is_empty() {
            return Err(Error::Config(
                "conversation.default_thread_id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum upload size in bytes (default: 100MB)
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            enable_cors: true,
            max_upload_size: 100 * 1024 * 1024, // 100MB
        }
    }
}

/// LLM (Ollama) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama base URL
    pub base_url: String,
    /// Chat model name (must support tool calling)
    pub chat_model: String,
    /// Temperature for generation
    pub temperature: f32,
    /// Per-call timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            chat_model: "llama3.1".to_string(),
            temperature: 0.5,
            timeout_secs: 120,
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Ollama embedding model
    pub model: String,
    /// Embedding dimensions (768 for nomic-embed-text)
    pub dimensions: usize,
    /// Number of retries for failed embedding requests
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            max_retries: 2,
        }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between chunks in characters
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorDbConfig {
    /// Directory holding one index file per collection
    pub storage_dir: PathBuf,
    /// Collection the ingestor writes and the retriever reads
    pub collection: String,
    /// HNSW M parameter
    pub hnsw_m: usize,
    /// HNSW ef_construction
    pub hnsw_ef_construction: usize,
    /// HNSW ef_search
    pub hnsw_ef_search: usize,
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        let storage_dir = dirs::data_local_dir()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
            .join("pdf-rag")
            .join("vectors");

        Self {
            storage_dir,
            collection: "pdf_documents".to_string(),
            hnsw_m: 32,
            hnsw_ef_construction: 200,
            hnsw_ef_search: 100,
        }
    }
}

/// Retrieval tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks returned per query
    pub top_k: usize,
    /// Drop results scoring below this cosine similarity
    pub min_similarity: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            min_similarity: None,
        }
    }
}

/// When the engine consults the retrieval tool
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalPolicy {
    /// The model chooses whether to call the tool
    #[default]
    ModelDecides,
    /// Every question is answered from retrieved context
    Always,
}

/// Conversation engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Thread used when a request does not name one
    pub default_thread_id: String,
    /// Retrieval policy
    pub retrieval_policy: RetrievalPolicy,
    /// Dispatch multiple tool calls of one turn concurrently
    pub parallel_tool_calls: bool,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            default_thread_id: "default".to_string(),
            retrieval_policy: RetrievalPolicy::ModelDecides,
            parallel_tool_calls: true,
        }
    }
}

/// Upload handling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Directory uploaded PDFs are written to
    pub upload_dir: PathBuf,
    /// Empty the upload directory at startup
    pub clear_uploads_on_start: bool,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("./uploaded_pdfs"),
            clear_uploads_on_start: true,
        }
    }
}

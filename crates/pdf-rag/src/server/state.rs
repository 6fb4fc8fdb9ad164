//! Application state for the answer service

use std::sync::Arc;

use crate::config::RagConfig;
use crate::conversation::ConversationStore;
use crate::engine::{EngineOptions, RagEngine};
use crate::error::Result;
use crate::ingestion::{prepare_upload_dir, IngestPipeline};
use crate::providers::{
    EmbeddingProvider, LlmProvider, LocalVectorStore, OllamaProvider, VectorStoreProvider,
};
use crate::retrieval::{VectorRetriever, VectorStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: RagConfig,
    /// Conversation engine
    engine: Arc<RagEngine>,
    /// Upload ingestion
    pipeline: Arc<IngestPipeline>,
    /// Chat model, probed by the readiness check
    llm: Arc<dyn LlmProvider>,
}

impl AppState {
    /// Create new application state backed by Ollama and the local vector index
    pub async fn new(config: RagConfig) -> Result<Self> {
        tracing::info!("Initializing application state...");

        prepare_upload_dir(
            &config.ingestion.upload_dir,
            config.ingestion.clear_uploads_on_start,
        )
        .await?;

        let vector_store = Arc::new(VectorStore::new(&config)?);
        tracing::info!(
            "Vector index '{}' ready with {} chunks",
            vector_store.collection(),
            vector_store.len()?
        );

        let (embedder, llm) = OllamaProvider::new(&config.llm, &config.embeddings)?.split();
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(embedder);
        let llm: Arc<dyn LlmProvider> = Arc::new(llm);
        let store: Arc<dyn VectorStoreProvider> = Arc::new(LocalVectorStore::new(vector_store));
        tracing::info!(
            "Using Ollama at {} (chat: {}, embeddings: {})",
            config.llm.base_url,
            llm.model(),
            config.embeddings.model
        );

        Ok(Self::from_parts(config, llm, embedder, store))
    }

    /// Assemble state from already-built providers
    pub fn from_parts(
        config: RagConfig,
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStoreProvider>,
    ) -> Self {
        let retriever = VectorRetriever::new(
            Arc::clone(&embedder),
            Arc::clone(&store),
            config.retrieval.top_k,
        )
        .with_min_similarity(config.retrieval.min_similarity);

        let engine = RagEngine::new(
            Arc::clone(&llm),
            Arc::new(retriever),
            ConversationStore::new(),
            EngineOptions::from(&config),
        );
        let pipeline = IngestPipeline::new(&config, embedder, store);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                engine: Arc::new(engine),
                pipeline: Arc::new(pipeline),
                llm,
            }),
        }
    }

    /// Get configuration
    pub fn config(&self) -> &RagConfig {
        &self.inner.config
    }

    /// Get the conversation engine
    pub fn engine(&self) -> &Arc<RagEngine> {
        &self.inner.engine
    }

    /// Get the ingestion pipeline
    pub fn pipeline(&self) -> &Arc<IngestPipeline> {
        &self.inner.pipeline
    }

    /// Whether the chat model endpoint answers
    pub async fn is_ready(&self) -> bool {
        match self.inner.llm.health_check().await {
            Ok(ready) => ready,
            Err(e) => {
                tracing::warn!("Model health check failed: {}", e);
                false
            }
        }
    }
}

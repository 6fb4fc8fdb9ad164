//! Provider abstractions for the chat model, embeddings and vector storage
//!
//! The engine and ingestor only see these traits, so tests can swap in
//! deterministic fakes for the Ollama and on-disk implementations.

pub mod embedding;
pub mod llm;
pub mod local;
pub mod ollama;
pub mod vector_store;

pub use embedding::EmbeddingProvider;
pub use llm::LlmProvider;
pub use local::LocalVectorStore;
pub use ollama::{OllamaEmbedder, OllamaLlm, OllamaProvider};
pub use vector_store::{VectorSearchResult, VectorStoreProvider};

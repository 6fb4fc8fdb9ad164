//! Local vector store provider
//!
//! Wraps the synchronous ruvector-backed `VectorStore` and moves its work off
//! the async runtime.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::retrieval::VectorStore;
use crate::types::Chunk;

use super::vector_store::{VectorSearchResult, VectorStoreProvider};

/// Local vector store backed by an on-disk HNSW index
pub struct LocalVectorStore {
    store: Arc<VectorStore>,
}

impl LocalVectorStore {
    /// Create from existing VectorStore
    pub fn new(store: Arc<VectorStore>) -> Self {
        Self { store }
    }
}

fn join_error(e: tokio::task::JoinError) -> Error {
    Error::Internal(format!("Task join error: {}", e))
}

#[async_trait]
impl VectorStoreProvider for LocalVectorStore {
    async fn insert_chunk(&self, chunk: &Chunk) -> Result<()> {
        let store = self.store.clone();
        let chunk = chunk.clone();
        tokio::task::spawn_blocking(move || store.insert_chunk(&chunk))
            .await
            .map_err(join_error)?
    }

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let store = self.store.clone();
        let chunks = chunks.to_vec();
        tokio::task::spawn_blocking(move || store.insert_chunks(&chunks))
            .await
            .map_err(join_error)?
    }

    async fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<VectorSearchResult>> {
        let store = self.store.clone();
        let query = query_embedding.to_vec();

        tokio::task::spawn_blocking(move || {
            let results = store.search(&query, top_k)?;
            Ok(results
                .into_iter()
                .map(|r| VectorSearchResult {
                    chunk: r.chunk,
                    similarity: r.similarity,
                })
                .collect())
        })
        .await
        .map_err(join_error)?
    }

    async fn delete_by_document(&self, document_id: &Uuid) -> Result<usize> {
        let store = self.store.clone();
        let doc_id = *document_id;
        tokio::task::spawn_blocking(move || store.delete_by_document(&doc_id))
            .await
            .map_err(join_error)?
    }

    async fn len(&self) -> Result<usize> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.len())
            .await
            .map_err(join_error)?
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn collection(&self) -> &str {
        self.store.collection()
    }

    fn name(&self) -> &str {
        "local-hnsw"
    }
}

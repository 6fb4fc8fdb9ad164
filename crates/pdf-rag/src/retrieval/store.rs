//! Vector store for chunk storage and search

use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

use ruvector_core::types::{DbOptions, HnswConfig};
use ruvector_core::{DistanceMetric, SearchQuery as CoreSearchQuery, VectorDB, VectorEntry};

use crate::config::{RagConfig, VectorDbConfig};
use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkSource};

/// Search result with chunk and similarity
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// The retrieved chunk (without its embedding)
    pub chunk: Chunk,
    /// Cosine similarity, higher is better
    pub similarity: f32,
}

/// Vector store wrapper for ruvector-core, one index file per collection
pub struct VectorStore {
    /// Underlying vector database
    db: VectorDB,
    collection: String,
    dimensions: usize,
    ef_search: usize,
    /// Mapping from document IDs to chunk IDs for deletion and upserts
    document_chunks: RwLock<HashMap<Uuid, Vec<String>>>,
}

impl VectorStore {
    /// Open (or create) the configured collection under `storage_dir`
    pub fn new(config: &RagConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.vector_db.storage_dir)?;
        let path = config
            .vector_db
            .storage_dir
            .join(format!("{}.db", config.vector_db.collection));
        Self::open(&path, &config.vector_db, config.embeddings.dimensions)
    }

    /// Open an index file, rebuilding the document map from what it holds
    pub fn open(path: &Path, config: &VectorDbConfig, dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::vector_db("Embedding dimensions must be positive"));
        }

        let options = DbOptions {
            dimensions,
            distance_metric: DistanceMetric::Cosine,
            storage_path: path.to_string_lossy().to_string(),
            hnsw_config: Some(HnswConfig {
                m: config.hnsw_m,
                ef_construction: config.hnsw_ef_construction,
                ef_search: config.hnsw_ef_search,
                max_elements: 10_000_000,
            }),
            quantization: None,
        };

        let store = Self {
            db: VectorDB::new(options)?,
            collection: config.collection.clone(),
            dimensions,
            ef_search: config.hnsw_ef_search,
            document_chunks: RwLock::new(HashMap::new()),
        };
        store.load_document_map()?;
        Ok(store)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Insert a chunk, replacing one with the same id
    pub fn insert_chunk(&self, chunk: &Chunk) -> Result<()> {
        self.insert_chunks(std::slice::from_ref(chunk))
    }

    /// Insert a batch of chunks. Nothing is written if any embedding is malformed.
    pub fn insert_chunks(&self, batch: &[Chunk]) -> Result<()> {
        for chunk in batch {
            self.check_embedding(chunk)?;
        }

        let mut doc_chunks = self.document_chunks.write();
        for chunk in batch {
            let chunk_id = chunk.id.to_string();
            let ids = doc_chunks.entry(chunk.document_id).or_default();
            if ids.contains(&chunk_id) {
                self.db.delete(&chunk_id)?;
            } else {
                ids.push(chunk_id.clone());
            }

            self.db.insert(VectorEntry {
                id: Some(chunk_id),
                vector: chunk.embedding.clone(),
                metadata: Some(chunk.to_vector_metadata()),
            })?;
        }

        Ok(())
    }

    /// Search for the `top_k` chunks closest to `query_embedding`
    pub fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        if query_embedding.len() != self.dimensions {
            return Err(Error::vector_db(format!(
                "Query has {} dimensions, collection '{}' expects {}",
                query_embedding.len(),
                self.collection,
                self.dimensions
            )));
        }

        let results = self.db.search(CoreSearchQuery {
            vector: query_embedding.to_vec(),
            k: top_k,
            filter: None,
            ef_search: Some(self.ef_search.max(top_k)),
        })?;

        let mut search_results: Vec<SearchResult> = results
            .into_iter()
            .filter_map(|result| {
                let metadata = result.metadata.as_ref()?;
                let chunk = metadata_to_chunk(&result.id, metadata)?;
                // Cosine distance back to similarity
                Some(SearchResult {
                    chunk,
                    similarity: 1.0 - result.score,
                })
            })
            .collect();

        search_results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });
        search_results.truncate(top_k);

        Ok(search_results)
    }

    /// Delete all chunks for a document
    pub fn delete_by_document(&self, document_id: &Uuid) -> Result<usize> {
        let chunk_ids = self.document_chunks.write().remove(document_id).unwrap_or_default();

        let mut deleted = 0;
        for chunk_id in &chunk_ids {
            if self.db.delete(chunk_id)? {
                deleted += 1;
            }
        }

        Ok(deleted)
    }

    /// Get chunk count
    pub fn len(&self) -> Result<usize> {
        Ok(self.db.len()?)
    }

    /// Check if empty
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn check_embedding(&self, chunk: &Chunk) -> Result<()> {
        if chunk.embedding.is_empty() {
            return Err(Error::vector_db("Chunk has no embedding"));
        }
        if chunk.embedding.len() != self.dimensions {
            return Err(Error::vector_db(format!(
                "Chunk embedding has {} dimensions, collection '{}' expects {}",
                chunk.embedding.len(),
                self.collection,
                self.dimensions
            )));
        }
        Ok(())
    }

    /// Recover which chunks belong to which document after a restart
    fn load_document_map(&self) -> Result<()> {
        let total = self.len()?;
        if total == 0 {
            return Ok(());
        }

        let mut probe = vec![0.0; self.dimensions];
        probe[0] = 1.0;
        let results = self.db.search(CoreSearchQuery {
            vector: probe,
            k: total,
            filter: None,
            ef_search: Some(total.max(self.ef_search)),
        })?;

        let mut doc_chunks = self.document_chunks.write();
        let mut found = 0;
        for result in results {
            let Some(chunk) = result
                .metadata
                .as_ref()
                .and_then(|metadata| metadata_to_chunk(&result.id, metadata))
            else {
                tracing::warn!("Skipping index entry {} without chunk metadata", result.id);
                continue;
            };
            doc_chunks.entry(chunk.document_id).or_default().push(result.id);
            found += 1;
        }

        if found < total {
            tracing::warn!(
                "Collection '{}' holds {} chunks but only {} were mapped to documents",
                self.collection,
                total,
                found
            );
        }
        tracing::info!(
            "Loaded {} chunks across {} documents for collection '{}'",
            found,
            doc_chunks.len(),
            self.collection
        );

        Ok(())
    }
}

/// Convert index metadata back to a chunk. Embeddings are not stored in metadata.
fn metadata_to_chunk(id: &str, metadata: &HashMap<String, serde_json::Value>) -> Option<Chunk> {
    let uuid_field = |key: &str| {
        metadata
            .get(key)
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
    };
    let u32_field = |key: &str| metadata.get(key).and_then(|v| v.as_u64()).map(|n| n as u32);

    let chunk_id = uuid_field("chunk_id").or_else(|| Uuid::parse_str(id).ok())?;
    let document_id = uuid_field("document_id")?;
    let content = metadata.get("content")?.as_str()?.to_string();
    let filename = metadata
        .get("filename")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    Some(Chunk {
        id: chunk_id,
        document_id,
        content,
        embedding: Vec::new(),
        source: ChunkSource {
            filename,
            page_number: u32_field("page_number"),
            page_count: u32_field("page_count"),
        },
        chunk_index: u32_field("chunk_index").unwrap_or(0),
    })
}

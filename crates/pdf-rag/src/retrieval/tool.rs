//! The `retriever` tool exposed to the chat model

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::generation::PromptBuilder;
use crate::providers::{EmbeddingProvider, VectorStoreProvider};
use crate::types::{Metadata, ToolSpec};

/// Name the retrieval tool is registered under
pub const RETRIEVER_TOOL_NAME: &str = "retriever";

/// One ranked passage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub content: String,
    pub metadata: Metadata,
    pub score: f32,
}

impl RetrievedChunk {
    /// `Source:<metadata>\nContent:<content>`
    pub fn render(&self) -> String {
        format!(
            "Source:{}\nContent:{}",
            render_metadata(&self.metadata),
            self.content
        )
    }
}

/// Rank-ordered retrieval output, most relevant first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunks: Vec<RetrievedChunk>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Text placed in the tool turn
    pub fn serialize(&self) -> String {
        if self.chunks.is_empty() {
            return PromptBuilder::no_passages_found();
        }
        self.chunks
            .iter()
            .map(RetrievedChunk::render)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Render metadata as `{'page': 1, 'source': 'geo.pdf'}`.
///
/// Keys come out sorted because `Metadata` is a `BTreeMap`.
pub fn render_metadata(metadata: &Metadata) -> String {
    let entries: Vec<String> = metadata
        .iter()
        .map(|(k, v)| format!("{}: {}", quote(k), render_value(v)))
        .collect();
    format!("{{{}}}", entries.join(", "))
}

fn render_value(value: &serde_json::Value) -> String {
    use serde_json::Value;

    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        Value::Array(items) => format!(
            "[{}]",
            items.iter().map(render_value).collect::<Vec<_>>().join(", ")
        ),
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let entries: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}: {}", quote(k), render_value(&map[k])))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// A tool the engine can dispatch retrieval requests to
#[async_trait]
pub trait RetrievalTool: Send + Sync {
    /// Declaration advertised to the model
    fn spec(&self) -> ToolSpec;

    /// Run one query, returning the tool-turn text and the structured result
    async fn retrieve(&self, query: &str) -> Result<(String, RetrievalResult)>;
}

/// Declaration shared by every retriever implementation
pub fn retriever_spec() -> ToolSpec {
    ToolSpec::single_string_param(
        RETRIEVER_TOOL_NAME,
        "Retrieve passages from the uploaded PDF documents that are relevant to a query.",
        "query",
        "Search query describing the information needed to answer the question",
    )
}

/// Retriever over the local vector index
pub struct VectorRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStoreProvider>,
    top_k: usize,
    min_similarity: Option<f32>,
}

impl VectorRetriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStoreProvider>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            top_k,
            min_similarity: None,
        }
    }

    /// Drop results scoring below `floor`
    pub fn with_min_similarity(mut self, floor: Option<f32>) -> Self {
        self.min_similarity = floor;
        self
    }
}

#[async_trait]
impl RetrievalTool for VectorRetriever {
    fn spec(&self) -> ToolSpec {
        retriever_spec()
    }

    async fn retrieve(&self, query: &str) -> Result<(String, RetrievalResult)> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::retrieval_unavailable("query is empty"));
        }

        let indexed = self
            .store
            .len()
            .await
            .map_err(|e| Error::retrieval_unavailable(e.to_string()))?;
        if indexed == 0 {
            return Err(Error::retrieval_unavailable(format!(
                "collection '{}' has no documents",
                self.store.collection()
            )));
        }

        let embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| Error::retrieval_unavailable(e.to_string()))?;

        let hits = self
            .store
            .search(&embedding, self.top_k)
            .await
            .map_err(|e| Error::retrieval_unavailable(e.to_string()))?;

        let chunks: Vec<RetrievedChunk> = hits
            .into_iter()
            .filter(|hit| self.min_similarity.map_or(true, |floor| hit.similarity >= floor))
            .map(|hit| RetrievedChunk {
                metadata: hit.chunk.metadata(),
                content: hit.chunk.content,
                score: hit.similarity,
            })
            .collect();

        tracing::debug!("Retrieved {} chunks for query '{}'", chunks.len(), query);

        let result = RetrievalResult { chunks };
        Ok((result.serialize(), result))
    }
}

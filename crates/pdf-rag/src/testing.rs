//! Deterministic fakes for the model, retriever and embedder

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::VectorDbConfig;
use crate::error::{Error, Result};
use crate::providers::{EmbeddingProvider, LlmProvider};
use crate::retrieval::{retriever_spec, RetrievalResult, RetrievalTool, RetrievedChunk, VectorStore};
use crate::types::{Metadata, ToolInvocationRequest, ToolSpec, Turn};

/// Model that replays a fixed script of replies and records every call
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<Turn>>>,
    calls: Mutex<Vec<(Vec<Turn>, Vec<ToolSpec>)>>,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<Turn>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Default::default()
        }
    }

    /// Sleep before every reply
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Inputs of every call, in order
    pub fn calls(&self) -> Vec<(Vec<Turn>, Vec<ToolSpec>)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedModel {
    async fn generate(&self, messages: &[Turn], tools: &[ToolSpec]) -> Result<Turn> {
        self.calls.lock().push((messages.to_vec(), tools.to_vec()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(Error::model("script exhausted")))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Assistant turn asking the retriever for each query, ids `call_0..`
pub fn tool_request(queries: &[&str]) -> Turn {
    let calls = queries
        .iter()
        .enumerate()
        .map(|(i, q)| {
            ToolInvocationRequest::new(
                format!("call_{}", i),
                "retriever",
                serde_json::json!({ "query": q }),
            )
        })
        .collect();
    Turn::assistant_with_tool_calls("", calls)
}

/// Retriever answering from a fixed table, with optional per-query latency
#[derive(Default)]
pub struct FakeRetriever {
    passages: HashMap<String, Vec<(String, String)>>,
    delays: HashMap<String, Duration>,
    unavailable: bool,
    queries: Mutex<Vec<String>>,
}

impl FakeRetriever {
    /// Index that holds nothing
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }

    /// Answer `query` with one passage from `source`
    pub fn with_passage(mut self, query: &str, source: &str, content: &str) -> Self {
        self.passages
            .entry(query.to_string())
            .or_default()
            .push((source.to_string(), content.to_string()));
        self
    }

    pub fn with_delay(mut self, query: &str, delay: Duration) -> Self {
        self.delays.insert(query.to_string(), delay);
        self
    }

    /// Queries received, in arrival order
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl RetrievalTool for FakeRetriever {
    fn spec(&self) -> ToolSpec {
        retriever_spec()
    }

    async fn retrieve(&self, query: &str) -> Result<(String, RetrievalResult)> {
        self.queries.lock().push(query.to_string());
        if let Some(delay) = self.delays.get(query) {
            tokio::time::sleep(*delay).await;
        }
        if self.unavailable {
            return Err(Error::retrieval_unavailable("collection is empty"));
        }

        let chunks = self
            .passages
            .get(query)
            .map(|hits| {
                hits.iter()
                    .map(|(source, content)| {
                        let mut metadata = Metadata::new();
                        metadata.insert("source".to_string(), serde_json::json!(source));
                        RetrievedChunk {
                            content: content.clone(),
                            metadata,
                            score: 1.0,
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        let result = RetrievalResult { chunks };
        Ok((result.serialize(), result))
    }
}

/// Bag-of-words embedder: each lowercase word hashes into one of 64 buckets
#[derive(Default)]
pub struct HashEmbedder;

impl HashEmbedder {
    pub const DIMENSIONS: usize = 64;
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; Self::DIMENSIONS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() % Self::DIMENSIONS as u64) as usize] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        Self::DIMENSIONS
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "hash"
    }
}

/// Index sized for `HashEmbedder`, stored under `dir`
pub fn temp_store(dir: &Path) -> Arc<VectorStore> {
    let path = dir.join("vectors.db");
    Arc::new(
        VectorStore::open(&path, &VectorDbConfig::default(), HashEmbedder::DIMENSIONS)
            .expect("open test index"),
    )
}

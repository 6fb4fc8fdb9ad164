//! pdf-rag: question answering over uploaded PDFs
//!
//! Uploaded documents are chunked, embedded and written to a local vector
//! index. Questions go through a conversation engine that lets the chat model
//! decide whether to call the `retriever` tool before answering, and keeps a
//! per-thread history consistent across those retrieval detours.

pub mod config;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod providers;
pub mod retrieval;
pub mod server;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use config::RagConfig;
pub use engine::{EngineOptions, RagEngine, TurnOutcome};
pub use error::{Error, Result};
pub use types::{Chunk, ChunkSource, Document, FileType, Role, ToolInvocationRequest, Turn};

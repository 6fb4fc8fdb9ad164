//! HTTP response bodies

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::Document;
use super::turn::Turn;

/// Body of `POST /ask/` and `GET /history/:thread_id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationResponse {
    /// Thread the turns belong to
    pub thread_id: String,
    /// Full turn sequence; the answer is the last entry
    pub messages: Vec<Turn>,
}

impl ConversationResponse {
    /// Content of the last turn
    pub fn answer(&self) -> Option<&str> {
        self.messages.last().map(|t| t.content())
    }
}

/// Body of `POST /upload_pdfs/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub documents: Vec<DocumentSummary>,
    pub total_chunks_created: u32,
    pub processing_time_ms: u64,
}

/// Per-document ingestion summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: Uuid,
    pub filename: String,
    pub total_pages: Option<u32>,
    pub total_chunks: u32,
    /// Chunks of an earlier upload of the same content that were replaced
    pub replaced_chunks: usize,
}

impl DocumentSummary {
    pub fn new(doc: &Document, replaced_chunks: usize) -> Self {
        Self {
            id: doc.id,
            filename: doc.filename.clone(),
            total_pages: doc.total_pages,
            total_chunks: doc.total_chunks,
            replaced_chunks,
        }
    }
}

//! Document and chunk types with provenance metadata

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Provenance attached to a chunk and returned by retrieval
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Supported file types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// PDF document
    Pdf,
    /// Plain text file
    Txt,
    /// Markdown file
    Markdown,
    /// Unknown file type
    Unknown,
}

impl FileType {
    /// Detect file type from extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "txt" | "text" => Self::Txt,
            "md" | "markdown" => Self::Markdown,
            _ => Self::Unknown,
        }
    }

    /// Detect file type from a filename
    pub fn from_filename(filename: &str) -> Self {
        match filename.rsplit_once('.') {
            Some((_, ext)) => Self::from_extension(ext),
            None => Self::Unknown,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// A document that has been ingested
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Stable id derived from the content hash
    pub id: Uuid,
    /// Filename as uploaded
    pub filename: String,
    /// File type
    pub file_type: FileType,
    /// SHA-256 of the extracted text
    pub content_hash: String,
    /// Total number of pages (if applicable)
    pub total_pages: Option<u32>,
    /// Total number of chunks created
    pub total_chunks: u32,
    /// File size in bytes
    pub file_size: u64,
    /// Ingestion timestamp
    pub ingested_at: chrono::DateTime<chrono::Utc>,
}

impl Document {
    /// Create a document record. The id is a v5 UUID of the content hash, so
    /// the same content always maps to the same document.
    pub fn new(filename: String, file_type: FileType, content_hash: String, file_size: u64) -> Self {
        Self {
            id: Uuid::new_v5(&Uuid::NAMESPACE_OID, content_hash.as_bytes()),
            filename,
            file_type,
            content_hash,
            total_pages: None,
            total_chunks: 0,
            file_size,
            ingested_at: chrono::Utc::now(),
        }
    }
}

/// Where a chunk came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkSource {
    /// Filename as uploaded
    pub filename: String,
    /// Page number (1-indexed)
    pub page_number: Option<u32>,
    /// Total pages in document
    pub page_count: Option<u32>,
}

/// A chunk of text from a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk ID
    pub id: Uuid,
    /// Parent document ID
    pub document_id: Uuid,
    /// Text content
    pub content: String,
    /// Embedding vector
    #[serde(default)]
    pub embedding: Vec<f32>,
    /// Provenance
    pub source: ChunkSource,
    /// Chunk index within document
    pub chunk_index: u32,
}

impl Chunk {
    /// Create a new chunk
    pub fn new(document_id: Uuid, content: String, source: ChunkSource, chunk_index: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            content,
            embedding: Vec::new(),
            source,
            chunk_index,
        }
    }

    /// Metadata surfaced to the retrieval tool
    pub fn metadata(&self) -> Metadata {
        let mut meta = Metadata::new();
        meta.insert("source".to_string(), serde_json::json!(self.source.filename));
        if let Some(page) = self.source.page_number {
            meta.insert("page".to_string(), serde_json::json!(page));
        }
        meta
    }

    /// Payload stored next to the vector in the index
    pub fn to_vector_metadata(&self) -> HashMap<String, serde_json::Value> {
        let mut meta = HashMap::new();
        meta.insert("chunk_id".to_string(), serde_json::json!(self.id.to_string()));
        meta.insert("document_id".to_string(), serde_json::json!(self.document_id.to_string()));
        meta.insert("filename".to_string(), serde_json::json!(self.source.filename));
        meta.insert("chunk_index".to_string(), serde_json::json!(self.chunk_index));
        meta.insert("content".to_string(), serde_json::json!(self.content));

        if let Some(page) = self.source.page_number {
            meta.insert("page_number".to_string(), serde_json::json!(page));
        }
        if let Some(count) = self.source.page_count {
            meta.insert("page_count".to_string(), serde_json::json!(count));
        }

        meta
    }
}

//! Ingestion pipeline orchestration

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::providers::{EmbeddingProvider, VectorStoreProvider};
use crate::types::{Chunk, Document};

use super::chunker::TextChunker;
use super::parser::{FileParser, ParsedDocument};

/// A document written to the vector index
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub document: Document,
    /// Chunks of an earlier upload with the same content that were replaced
    pub replaced_chunks: usize,
}

/// An upload that has been parsed, chunked and embedded but not yet saved
/// or indexed
pub struct PreparedUpload {
    filename: String,
    data: Vec<u8>,
    document: Document,
    chunks: Vec<Chunk>,
}

/// Main ingestion pipeline: parse, chunk, embed, then save and upsert
pub struct IngestPipeline {
    chunker: Arc<TextChunker>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStoreProvider>,
    upload_dir: PathBuf,
}

impl IngestPipeline {
    /// Create a new ingestion pipeline
    pub fn new(
        config: &RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStoreProvider>,
    ) -> Self {
        Self {
            chunker: Arc::new(TextChunker::new(
                config.chunking.chunk_size,
                config.chunking.chunk_overlap,
            )),
            embedder,
            store,
            upload_dir: config.ingestion.upload_dir.clone(),
        }
    }

    /// Ingest a batch of uploads.
    ///
    /// Every file is prepared before any is saved or indexed, so a file that
    /// fails to parse or embed leaves the index and upload directory untouched.
    pub async fn ingest_all(&self, files: Vec<(String, Vec<u8>)>) -> Result<Vec<IngestOutcome>> {
        let mut prepared = Vec::with_capacity(files.len());
        for (filename, data) in files {
            prepared.push(self.prepare(&filename, data).await?);
        }

        let mut outcomes = Vec::with_capacity(prepared.len());
        for upload in prepared {
            outcomes.push(self.commit(upload).await?);
        }
        Ok(outcomes)
    }

    /// Parse, chunk and embed one upload without side effects
    pub async fn prepare(&self, filename: &str, data: Vec<u8>) -> Result<PreparedUpload> {
        let filename = sanitize_filename(filename)?;

        let chunker = Arc::clone(&self.chunker);
        let name = filename.clone();
        let (document, mut chunks, data) = tokio::task::spawn_blocking(move || {
            prepare_with(&chunker, &name, &data).map(|(doc, chunks)| (doc, chunks, data))
        })
        .await
        .map_err(|e| Error::Internal(format!("Task join error: {}", e)))??;

        if chunks.is_empty() {
            return Err(Error::file_parse(&filename, "No text chunks were produced"));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(Error::embedding(format!(
                "Expected {} embeddings, got {}",
                chunks.len(),
                embeddings.len()
            )));
        }
        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            chunk.embedding = embedding;
        }

        Ok(PreparedUpload {
            filename,
            data,
            document,
            chunks,
        })
    }

    /// Save the upload and replace its document's chunks in the index.
    ///
    /// Chunks are upserted by document id, which is derived from the content
    /// hash, so uploading the same content again replaces its chunks.
    pub async fn commit(&self, upload: PreparedUpload) -> Result<IngestOutcome> {
        let PreparedUpload {
            filename,
            data,
            mut document,
            chunks,
        } = upload;

        let path = self.upload_dir.join(&filename);
        tokio::fs::write(&path, &data).await?;
        tracing::debug!("Saved upload to {}", path.display());

        let replaced_chunks = self.store.delete_by_document(&document.id).await?;
        self.store.insert_chunks(&chunks).await?;
        document.total_chunks = chunks.len() as u32;

        tracing::info!(
            "Ingested {} into '{}': {} chunks ({} replaced)",
            filename,
            self.store.collection(),
            document.total_chunks,
            replaced_chunks
        );

        Ok(IngestOutcome {
            document,
            replaced_chunks,
        })
    }
}

/// Parse + chunk without touching the index
fn prepare_with(chunker: &TextChunker, filename: &str, data: &[u8]) -> Result<(Document, Vec<Chunk>)> {
    let parsed: ParsedDocument = FileParser::parse(filename, data)?;

    let mut doc = Document::new(
        filename.to_string(),
        parsed.file_type.clone(),
        parsed.content_hash.clone(),
        data.len() as u64,
    );
    doc.total_pages = parsed.total_pages;

    let chunks = chunker.chunk_document(&doc, &parsed);
    doc.total_chunks = chunks.len() as u32;

    Ok((doc, chunks))
}

/// Keep only the final path component of a client-supplied filename
pub fn sanitize_filename(filename: &str) -> Result<String> {
    let name = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();

    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::InvalidRequest(format!("Invalid filename '{}'", filename)));
    }
    Ok(name.to_string())
}

/// Create the upload directory, emptying it first when `clear` is set
pub async fn prepare_upload_dir(dir: &Path, clear: bool) -> Result<()> {
    if clear && tokio::fs::try_exists(dir).await? {
        tracing::info!("Clearing upload directory {}", dir.display());
        tokio::fs::remove_dir_all(dir).await?;
    }
    tokio::fs::create_dir_all(dir).await?;
    Ok(())
}

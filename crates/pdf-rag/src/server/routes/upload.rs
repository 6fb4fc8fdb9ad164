//! PDF upload endpoint

use axum::{
    extract::{Multipart, State},
    Json,
};
use std::time::Instant;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{DocumentSummary, UploadResponse};

/// Multipart field carrying the uploaded files
const FILES_FIELD: &str = "files";

/// POST /upload_pdfs/ - Ingest every uploaded file into the vector index.
///
/// The batch is indexed only if every file parses and embeds.
pub async fn upload_pdfs(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let start = Instant::now();
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidRequest(format!("Failed to read multipart field: {}", e)))?
    {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(|s| s.to_string())
            .ok_or_else(|| Error::InvalidRequest("Uploaded file has no filename".to_string()))?;

        let data = field
            .bytes()
            .await
            .map_err(|e| Error::InvalidRequest(format!("Failed to read {}: {}", filename, e)))?;

        tracing::info!("Processing file: {} ({} bytes)", filename, data.len());
        files.push((filename, data.to_vec()));
    }

    if files.is_empty() {
        return Err(Error::InvalidRequest(format!(
            "No files found in multipart field '{}'",
            FILES_FIELD
        )));
    }

    let outcomes = state.pipeline().ingest_all(files).await.map_err(|e| {
        tracing::error!("Error during upload: {}", e);
        e
    })?;

    let total_chunks = outcomes.iter().map(|o| o.document.total_chunks).sum();
    let documents: Vec<DocumentSummary> = outcomes
        .iter()
        .map(|o| DocumentSummary::new(&o.document, o.replaced_chunks))
        .collect();

    tracing::info!("Received {} files, documents added to the vector index", documents.len());

    Ok(Json(UploadResponse {
        message: "Files processed and vectorstore updated".to_string(),
        documents,
        total_chunks_created: total_chunks,
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}

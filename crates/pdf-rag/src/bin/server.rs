//! PDF RAG server binary
//!
//! Run with: cargo run -p pdf-rag --bin pdf-rag-server

use pdf_rag::{config::RagConfig, server::RagServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf_rag=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = RagConfig::from_env()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Chat model: {}", config.llm.chat_model);
    tracing::info!("  - Embedding model: {} ({} dims)", config.embeddings.model, config.embeddings.dimensions);
    tracing::info!("  - Chunking: {} chars, {} overlap", config.chunking.chunk_size, config.chunking.chunk_overlap);
    tracing::info!("  - Retrieval: top {} ({:?})", config.retrieval.top_k, config.conversation.retrieval_policy);
    tracing::info!("  - Collection: {} in {}", config.vector_db.collection, config.vector_db.storage_dir.display());

    // Check Ollama
    tracing::info!("Checking Ollama at {}...", config.llm.base_url);
    let client = reqwest::Client::new();
    match client.get(format!("{}/api/tags", config.llm.base_url)).send().await {
        Ok(resp) if resp.status().is_success() => {
            tracing::info!("Ollama is running");
        }
        _ => {
            tracing::warn!("Ollama not available at {}", config.llm.base_url);
            tracing::warn!("Please start Ollama:");
            tracing::warn!("  1. Start: ollama serve");
            tracing::warn!(
                "  2. Pull models: ollama pull {} && ollama pull {}",
                config.embeddings.model,
                config.llm.chat_model
            );
        }
    }

    // Create and start server
    let server = RagServer::new(config).await?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("\nEndpoints:");
    println!("  POST /upload_pdfs/          - Upload PDFs (multipart field 'files')");
    println!("  POST /ask/                  - Ask a question (form fields 'question', 'thread_id')");
    println!("  GET  /history/:thread_id    - Conversation history");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}

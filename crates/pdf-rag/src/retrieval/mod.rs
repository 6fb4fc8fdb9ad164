//! Vector search and the retrieval tool

mod store;
mod tool;

pub use store::{SearchResult, VectorStore};
pub use tool::{
    render_metadata, retriever_spec, RetrievalResult, RetrievalTool, RetrievedChunk,
    VectorRetriever, RETRIEVER_TOOL_NAME,
};

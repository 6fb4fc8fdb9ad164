//! Core types for the PDF RAG service

pub mod document;
pub mod response;
pub mod tool;
pub mod turn;

pub use document::{Chunk, ChunkSource, Document, FileType, Metadata};
pub use response::{ConversationResponse, DocumentSummary, UploadResponse};
pub use tool::ToolSpec;
pub use turn::{Role, ToolInvocationRequest, Turn};

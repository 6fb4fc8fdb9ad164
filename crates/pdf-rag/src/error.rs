//! Error types for the PDF RAG service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, Error>;

/// Service errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bad client input
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// File parsing error
    #[error("Failed to parse file '{filename}': {message}")]
    FileParse { filename: String, message: String },

    /// Unsupported file type
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// Embedding error
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// Vector index error
    #[error("Vector index error: {0}")]
    VectorDb(String),

    /// The vector index is empty or could not be queried
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// The model asked for a tool that is not registered
    #[error("Unknown tool requested: {0}")]
    UnknownToolRequested(String),

    /// Language model call failed or timed out
    #[error("Model invocation failed: {0}")]
    ModelInvocation(String),

    /// A tool turn does not line up with the request that produced it
    #[error("Malformed tool call correlation: {0}")]
    MalformedToolCallCorrelation(String),

    /// No conversation exists for the thread id
    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a file parse error
    pub fn file_parse(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FileParse {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create a vector db error
    pub fn vector_db(message: impl Into<String>) -> Self {
        Self::VectorDb(message.into())
    }

    /// Create a retrieval unavailable error
    pub fn retrieval_unavailable(message: impl Into<String>) -> Self {
        Self::RetrievalUnavailable(message.into())
    }

    /// Create a model invocation error
    pub fn model(message: impl Into<String>) -> Self {
        Self::ModelInvocation(message.into())
    }

    /// Create a tool correlation error
    pub fn correlation(message: impl Into<String>) -> Self {
        Self::MalformedToolCallCorrelation(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Stable identifier used in JSON error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config_error",
            Error::InvalidRequest(_) => "invalid_request",
            Error::FileParse { .. } => "parse_error",
            Error::UnsupportedFileType(_) => "unsupported_type",
            Error::Embedding(_) => "embedding_error",
            Error::VectorDb(_) => "vector_db_error",
            Error::RetrievalUnavailable(_) => "retrieval_unavailable",
            Error::UnknownToolRequested(_) => "unknown_tool_requested",
            Error::ModelInvocation(_) => "model_invocation_failure",
            Error::MalformedToolCallCorrelation(_) => "malformed_tool_call_correlation",
            Error::ThreadNotFound(_) => "not_found",
            Error::Io(_) => "io_error",
            Error::Json(_) => "json_error",
            Error::Http(_) => "http_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Whether this error ends the current conversation turn
    pub fn is_fatal_for_turn(&self) -> bool {
        matches!(
            self,
            Error::UnknownToolRequested(_)
                | Error::ModelInvocation(_)
                | Error::MalformedToolCallCorrelation(_)
        )
    }
}

impl From<ruvector_core::RuvectorError> for Error {
    fn from(err: ruvector_core::RuvectorError) -> Self {
        Error::VectorDb(err.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Error::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Error::FileParse { filename, message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to parse '{}': {}", filename, message),
            ),
            Error::UnsupportedFileType(ext) => (
                StatusCode::BAD_REQUEST,
                format!("Unsupported file type: {}", ext),
            ),
            Error::ThreadNotFound(id) => {
                (StatusCode::NOT_FOUND, format!("Thread not found: {}", id))
            }
            // Turn failures stay generic on the wire; details go to the server log.
            err if err.is_fatal_for_turn() || matches!(err, Error::RetrievalUnavailable(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to answer the question, please try again".to_string(),
            ),
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        };

        let body = Json(json!({
            "error": {
                "type": self.kind(),
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

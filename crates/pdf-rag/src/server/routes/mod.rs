//! Routes of the answer service

pub mod ask;
pub mod history;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Json, Router,
};
use crate::server::state::AppState;

/// Build all service routes.
///
/// `/ask/` and `/upload_pdfs/` are also served without the trailing slash.
pub fn service_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        .route("/ask/", post(ask::ask_question))
        .route("/ask", post(ask::ask_question))
        // Uploads get a larger body limit
        .route(
            "/upload_pdfs/",
            post(upload::upload_pdfs).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route(
            "/upload_pdfs",
            post(upload::upload_pdfs).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route("/history/:thread_id", get(history::get_history))
        .route("/test", get(test_message))
}

/// Connectivity probe used by the chat client
async fn test_message() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Testing successfull..." }))
}

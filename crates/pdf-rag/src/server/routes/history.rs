//! Conversation history endpoint

use axum::{
    extract::{Path, State},
    Json,
};

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::ConversationResponse;

/// GET /history/:thread_id - Full turn sequence of a thread
pub async fn get_history(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<ConversationResponse>> {
    let conversation = state
        .engine()
        .conversations()
        .snapshot(&thread_id)
        .await
        .ok_or_else(|| Error::ThreadNotFound(thread_id.clone()))?;

    Ok(Json(ConversationResponse {
        thread_id: conversation.thread_id().to_string(),
        messages: conversation.turns().to_vec(),
    }))
}

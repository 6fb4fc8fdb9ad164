//! Question answering endpoint

use axum::{extract::State, Form, Json};
use serde::Deserialize;

use crate::error::Result;
use crate::server::state::AppState;
use crate::types::ConversationResponse;

/// Form body of `POST /ask/`
#[derive(Debug, Deserialize)]
pub struct AskForm {
    #[serde(default)]
    pub question: String,
    /// Conversation to continue; the configured default thread when absent
    #[serde(default)]
    pub thread_id: Option<String>,
}

/// POST /ask/ - Answer a question within a conversation thread
pub async fn ask_question(
    State(state): State<AppState>,
    Form(form): Form<AskForm>,
) -> Result<Json<ConversationResponse>> {
    let thread_id = form
        .thread_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .unwrap_or(state.config().conversation.default_thread_id.as_str())
        .to_string();

    tracing::info!("User query on thread {}: {}", thread_id, form.question);

    let outcome = state.engine().ask(&thread_id, &form.question).await?;

    tracing::info!("Query successful, thread {} has {} turns", thread_id, outcome.messages.len());

    Ok(Json(ConversationResponse {
        thread_id: outcome.thread_id,
        messages: outcome.messages,
    }))
}

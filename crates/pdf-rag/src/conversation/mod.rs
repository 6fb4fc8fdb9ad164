//! Per-thread conversation logs

mod curation;

pub use curation::{check_tool_correlation, curate, trailing_tool_turns, CuratedContext};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::types::Turn;

/// Append-only turn log for one thread
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    thread_id: String,
    turns: Vec<Turn>,
    created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            turns: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Append a batch of turns in order
    pub fn extend(&mut self, turns: impl IntoIterator<Item = Turn>) {
        self.turns.extend(turns);
    }
}

/// Shared handle to one thread's conversation.
///
/// The lock is held for a whole engine invocation, which serializes turns
/// on the same thread.
pub type ConversationHandle = Arc<Mutex<Conversation>>;

/// In-memory conversation store keyed by thread id
#[derive(Clone, Default)]
pub struct ConversationStore {
    threads: Arc<DashMap<String, ConversationHandle>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lease on `thread_id`, creating an empty conversation on first use.
    ///
    /// A thread that still has no committed turns when its last lease is
    /// dropped is removed again.
    pub fn lease(&self, thread_id: &str) -> ThreadLease {
        let handle = self
            .threads
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Conversation::new(thread_id))))
            .clone();

        ThreadLease {
            threads: Arc::clone(&self.threads),
            thread_id: thread_id.to_string(),
            handle,
        }
    }

    /// Copy of the conversation, waiting for any in-flight turn to finish.
    /// Threads without committed turns are not reported.
    pub async fn snapshot(&self, thread_id: &str) -> Option<Conversation> {
        let handle = self.threads.get(thread_id).map(|entry| entry.value().clone())?;
        let conversation = handle.lock().await;
        (!conversation.is_empty()).then(|| conversation.clone())
    }

    pub fn contains(&self, thread_id: &str) -> bool {
        self.threads.contains_key(thread_id)
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}

/// Access to one thread's conversation for the duration of an engine call
pub struct ThreadLease {
    threads: Arc<DashMap<String, ConversationHandle>>,
    thread_id: String,
    handle: ConversationHandle,
}

impl ThreadLease {
    pub fn handle(&self) -> &ConversationHandle {
        &self.handle
    }
}

impl Drop for ThreadLease {
    fn drop(&mut self) {
        // The map and this lease are the only owners while the shard lock is
        // held, so no other caller can be waiting on the conversation.
        let removed = self.threads.remove_if(&self.thread_id, |_, handle| {
            Arc::ptr_eq(handle, &self.handle)
                && Arc::strong_count(handle) == 2
                && handle.try_lock().map_or(false, |c| c.is_empty())
        });
        if removed.is_some() {
            tracing::debug!(thread_id = %self.thread_id, "Released thread with no committed turns");
        }
    }
}

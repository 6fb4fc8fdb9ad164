//! Retrieval-augmented conversation engine
//!
//! Each call to [`RagEngine::ask`] drives one user turn through
//! DECIDING → [RETRIEVING] → GENERATING → DONE. Turns produced along the way
//! are staged and only committed to the thread's conversation once the final
//! answer exists; any fatal error, or dropping the future, leaves the
//! conversation as it was.

mod state;

pub use state::{after_decision, validate_request_ids, EngineState};

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{RagConfig, RetrievalPolicy};
use crate::conversation::{curate, ConversationStore};
use crate::error::{Error, Result};
use crate::generation::PromptBuilder;
use crate::providers::LlmProvider;
use crate::retrieval::RetrievalTool;
use crate::types::{Role, ToolInvocationRequest, ToolSpec, Turn};

/// Engine tuning
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub retrieval_policy: RetrievalPolicy,
    /// Run the requests of one assistant turn concurrently
    pub parallel_tool_calls: bool,
    /// Upper bound on a single model call
    pub model_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&RagConfig::default())
    }
}

impl From<&RagConfig> for EngineOptions {
    fn from(config: &RagConfig) -> Self {
        Self {
            retrieval_policy: config.conversation.retrieval_policy,
            parallel_tool_calls: config.conversation.parallel_tool_calls,
            model_timeout: Duration::from_secs(config.llm.timeout_secs),
        }
    }
}

/// Result of one completed turn
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub thread_id: String,
    /// Final assistant turn
    pub answer: Turn,
    /// Full committed sequence for the thread, ending with `answer`
    pub messages: Vec<Turn>,
    /// Number of turns this invocation added
    pub appended: usize,
}

/// Committed history plus the turns staged by the current invocation
struct Transcript<'a> {
    committed: &'a [Turn],
    staged: Vec<Turn>,
}

impl<'a> Transcript<'a> {
    fn new(committed: &'a [Turn]) -> Self {
        Self {
            committed,
            staged: Vec::new(),
        }
    }

    fn stage(&mut self, turn: Turn) {
        self.staged.push(turn);
    }

    fn turns(&self) -> Vec<Turn> {
        self.committed
            .iter()
            .chain(self.staged.iter())
            .cloned()
            .collect()
    }
}

/// The conversation engine shared by all request handlers
pub struct RagEngine {
    model: Arc<dyn LlmProvider>,
    retriever: Arc<dyn RetrievalTool>,
    conversations: ConversationStore,
    options: EngineOptions,
    tool: ToolSpec,
}

impl RagEngine {
    pub fn new(
        model: Arc<dyn LlmProvider>,
        retriever: Arc<dyn RetrievalTool>,
        conversations: ConversationStore,
        options: EngineOptions,
    ) -> Self {
        let tool = retriever.spec();
        Self {
            model,
            retriever,
            conversations,
            options,
            tool,
        }
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    /// Answer `question` on `thread_id`.
    ///
    /// Holds the thread's lock until the turn is committed, so concurrent
    /// questions on one thread run one after the other.
    pub async fn ask(&self, thread_id: &str, question: &str) -> Result<TurnOutcome> {
        if question.trim().is_empty() {
            return Err(Error::InvalidRequest("question must not be empty".to_string()));
        }

        let lease = self.conversations.lease(thread_id);
        let mut conversation = lease.handle().lock().await;

        let staged = {
            let mut transcript = Transcript::new(conversation.turns());
            transcript.stage(Turn::human(question));

            match self.run(&mut transcript, question).await {
                Ok(answer) => {
                    transcript.stage(answer);
                    transcript.staged
                }
                Err(e) => {
                    tracing::error!(thread_id, error = %e, "Turn failed, nothing committed");
                    return Err(e);
                }
            }
        };

        let appended = staged.len();
        conversation.extend(staged);

        let messages = conversation.turns().to_vec();
        let answer = messages
            .last()
            .cloned()
            .ok_or_else(|| Error::internal("committed conversation is empty"))?;

        tracing::info!(
            thread_id,
            appended,
            total = messages.len(),
            "Turn committed"
        );

        Ok(TurnOutcome {
            thread_id: thread_id.to_string(),
            answer,
            messages,
            appended,
        })
    }

    /// Drive the state machine to DONE and return the final answer
    async fn run(&self, transcript: &mut Transcript<'_>, question: &str) -> Result<Turn> {
        let mut state = EngineState::Deciding;
        loop {
            state = self.step(state, transcript, question).await?;
            tracing::debug!(state = state.name(), "Engine transition");
            if let EngineState::Done(answer) = state {
                return Ok(answer);
            }
        }
    }

    /// One transition
    async fn step(
        &self,
        state: EngineState,
        transcript: &mut Transcript<'_>,
        question: &str,
    ) -> Result<EngineState> {
        match state {
            EngineState::Deciding => self.decide(transcript, question).await,
            EngineState::Retrieving { requests } => {
                for turn in self.retrieve_all(&requests).await {
                    transcript.stage(turn);
                }
                Ok(EngineState::Generating)
            }
            EngineState::Generating => self.generate(transcript).await,
            done @ EngineState::Done(_) => Ok(done),
        }
    }

    async fn decide(&self, transcript: &mut Transcript<'_>, question: &str) -> Result<EngineState> {
        let reply = match self.options.retrieval_policy {
            RetrievalPolicy::Always => Turn::assistant_with_tool_calls(
                "",
                vec![ToolInvocationRequest::new(
                    "call_0",
                    self.tool.name.clone(),
                    serde_json::json!({ "query": question }),
                )],
            ),
            RetrievalPolicy::ModelDecides => {
                let tools = std::slice::from_ref(&self.tool);
                self.invoke_model(&transcript.turns(), tools).await?
            }
        };

        let next = after_decision(&reply, &self.tool.name)?;
        if matches!(next, EngineState::Retrieving { .. }) {
            transcript.stage(reply);
        }
        Ok(next)
    }

    /// Tool turns in request order, whatever order retrievals finish in
    async fn retrieve_all(&self, requests: &[ToolInvocationRequest]) -> Vec<Turn> {
        if self.options.parallel_tool_calls {
            join_all(requests.iter().map(|r| self.retrieve_one(r))).await
        } else {
            let mut turns = Vec::with_capacity(requests.len());
            for request in requests {
                turns.push(self.retrieve_one(request).await);
            }
            turns
        }
    }

    /// Execute one request. Failures become a tool turn saying retrieval failed.
    async fn retrieve_one(&self, request: &ToolInvocationRequest) -> Turn {
        let content = match request.str_argument("query").filter(|q| !q.trim().is_empty()) {
            None => {
                tracing::warn!(call_id = %request.id, "Tool call without a usable query argument");
                PromptBuilder::retrieval_failed("the request had no query")
            }
            Some(query) => match self.retriever.retrieve(query).await {
                Ok((text, result)) => {
                    tracing::debug!(call_id = %request.id, chunks = result.chunks.len(), "Retrieved");
                    text
                }
                Err(e) => {
                    tracing::warn!(call_id = %request.id, error = %e, "Retrieval degraded");
                    PromptBuilder::retrieval_failed(&e.to_string())
                }
            },
        };
        Turn::tool(request.id.clone(), content)
    }

    async fn generate(&self, transcript: &Transcript<'_>) -> Result<EngineState> {
        let curated = curate(&transcript.turns())?;
        let reply = self.invoke_model(&curated.to_model_input(), &[]).await?;

        if let Some(call) = reply.tool_calls().first() {
            return Err(Error::UnknownToolRequested(call.name.clone()));
        }
        Ok(EngineState::Done(reply))
    }

    /// One model call under the configured timeout
    async fn invoke_model(&self, messages: &[Turn], tools: &[ToolSpec]) -> Result<Turn> {
        let reply = tokio::time::timeout(self.options.model_timeout, self.model.generate(messages, tools))
            .await
            .map_err(|_| {
                Error::model(format!(
                    "{} did not reply within {:?}",
                    self.model.model(),
                    self.options.model_timeout
                ))
            })?
            .map_err(|e| match e {
                Error::ModelInvocation(_) => e,
                other => Error::model(other.to_string()),
            })?;

        if reply.role() != Role::Assistant {
            return Err(Error::model(format!(
                "model replied with role '{}'",
                reply.role()
            )));
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{tool_request, FakeRetriever, ScriptedModel};
    use serde_json::json;

    const PARIS: &str = "The capital of France is Paris.";

    fn engine(model: &Arc<ScriptedModel>, retriever: &Arc<FakeRetriever>) -> RagEngine {
        engine_with(model, retriever, EngineOptions::default())
    }

    fn engine_with(
        model: &Arc<ScriptedModel>,
        retriever: &Arc<FakeRetriever>,
        options: EngineOptions,
    ) -> RagEngine {
        RagEngine::new(
            model.clone(),
            retriever.clone(),
            ConversationStore::new(),
            options,
        )
    }

    fn roles(turns: &[Turn]) -> Vec<Role> {
        turns.iter().map(|t| t.role()).collect()
    }

    async fn committed_len(engine: &RagEngine, thread: &str) -> usize {
        engine
            .conversations()
            .snapshot(thread)
            .await
            .map_or(0, |c| c.len())
    }

    #[tokio::test]
    async fn test_answer_without_retrieval() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(Turn::assistant("Hello! How can I help?"))]));
        let retriever = Arc::new(FakeRetriever::default());
        let engine = engine(&model, &retriever);

        let outcome = engine.ask("t", "Hi there").await.unwrap();

        assert_eq!(model.call_count(), 1);
        assert!(retriever.queries().is_empty());
        assert_eq!(roles(&outcome.messages), vec![Role::Human, Role::Assistant]);
        assert_eq!(outcome.answer.content(), "Hello! How can I help?");
        assert_eq!(outcome.appended, 2);

        let (input, tools) = &model.calls()[0];
        assert_eq!(input.len(), 1);
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "retriever");
    }

    #[tokio::test]
    async fn test_empty_index_degrades() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(tool_request(&["capital of France"])),
            Ok(Turn::assistant("I don't know.")),
        ]));
        let retriever = Arc::new(FakeRetriever::unavailable());
        let engine = engine(&model, &retriever);

        let outcome = engine.ask("t", "What is the capital of France?").await.unwrap();

        assert_eq!(
            roles(&outcome.messages),
            vec![Role::Human, Role::Assistant, Role::Tool, Role::Assistant]
        );
        let tool = &outcome.messages[2];
        assert_eq!(tool.tool_call_id(), Some("call_0"));
        assert!(tool.content().starts_with("Retrieval failed"));

        let (input, tools) = &model.calls()[1];
        assert!(tools.is_empty());
        assert!(input[0].content().contains("Retrieval failed"));
        assert_eq!(outcome.answer.content(), "I don't know.");
    }

    #[tokio::test]
    async fn test_retrieved_passage_reaches_generation() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(tool_request(&["capital of France"])),
            Ok(Turn::assistant("Paris.")),
        ]));
        let retriever = Arc::new(FakeRetriever::default().with_passage("capital of France", "geo.pdf", PARIS));
        let engine = engine(&model, &retriever);

        let outcome = engine.ask("t", "What is the capital of France?").await.unwrap();

        assert_eq!(
            outcome.messages[2].content(),
            "Source:{'source': 'geo.pdf'}\nContent:The capital of France is Paris."
        );
        let (input, _) = &model.calls()[1];
        assert_eq!(input[0].role(), Role::System);
        assert!(input[0]
            .content()
            .ends_with("\n\nSource:{'source': 'geo.pdf'}\nContent:The capital of France is Paris."));
        assert_eq!(roles(&input[1..]), vec![Role::Human]);
        assert_eq!(outcome.answer.content(), "Paris.");
    }

    #[tokio::test]
    async fn test_follow_up_sees_prior_exchange() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(tool_request(&["capital of France"])),
            Ok(Turn::assistant("Paris.")),
            Ok(tool_request(&["population of Paris"])),
            Ok(Turn::assistant("About two million.")),
        ]));
        let retriever = Arc::new(FakeRetriever::default().with_passage("capital of France", "geo.pdf", PARIS));
        let engine = engine(&model, &retriever);

        engine.ask("t", "What is the capital of France?").await.unwrap();
        let outcome = engine.ask("t", "What is its population?").await.unwrap();
        assert_eq!(outcome.messages.len(), 8);

        let calls = model.calls();
        let decide_input = &calls[2].0;
        assert_eq!(decide_input.len(), 5);

        let generate_input: Vec<&str> = calls[3].0[1..].iter().map(|t| t.content()).collect();
        assert_eq!(
            generate_input,
            vec!["What is the capital of France?", "Paris.", "What is its population?"]
        );
        assert!(!calls[3].0[0].content().contains(PARIS));
    }

    #[tokio::test]
    async fn test_generation_failure_commits_nothing() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(Turn::assistant("Hi.")),
            Ok(tool_request(&["capital of France"])),
            Err(Error::model("connection refused")),
        ]));
        let retriever = Arc::new(FakeRetriever::default());
        let engine = engine(&model, &retriever);

        engine.ask("t", "Hello").await.unwrap();
        let err = engine.ask("t", "What is the capital of France?").await.unwrap_err();

        assert!(matches!(err, Error::ModelInvocation(_)));
        assert_eq!(committed_len(&engine, "t").await, 2);
    }

    #[tokio::test]
    async fn test_tool_turns_follow_request_order() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(tool_request(&["slow", "fast"])),
            Ok(Turn::assistant("done")),
        ]));
        let retriever = Arc::new(
            FakeRetriever::default()
                .with_passage("slow", "a.pdf", "slow passage")
                .with_passage("fast", "b.pdf", "fast passage")
                .with_delay("slow", Duration::from_millis(60)),
        );
        let engine = engine(&model, &retriever);

        let outcome = engine.ask("t", "q").await.unwrap();

        let tools: Vec<(&str, &str)> = outcome
            .messages
            .iter()
            .filter(|t| t.role() == Role::Tool)
            .map(|t| (t.tool_call_id().unwrap_or_default(), t.content()))
            .collect();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].0, "call_0");
        assert!(tools[0].1.ends_with("slow passage"));
        assert_eq!(tools[1].0, "call_1");
        assert!(tools[1].1.ends_with("fast passage"));

        let system = &model.calls()[1].0[0];
        let slow_at = system.content().find("slow passage").unwrap();
        let fast_at = system.content().find("fast passage").unwrap();
        assert!(slow_at < fast_at);
    }

    #[tokio::test]
    async fn test_sequential_dispatch_keeps_order() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(tool_request(&["one", "two"])),
            Ok(Turn::assistant("done")),
        ]));
        let retriever = Arc::new(FakeRetriever::default());
        let options = EngineOptions {
            parallel_tool_calls: false,
            ..EngineOptions::default()
        };
        let engine = engine_with(&model, &retriever, options);

        engine.ask("t", "q").await.unwrap();
        assert_eq!(retriever.queries(), vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_fatal() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(Turn::assistant_with_tool_calls(
            "",
            vec![ToolInvocationRequest::new("call_0", "web_search", json!({"q": "x"}))],
        ))]));
        let retriever = Arc::new(FakeRetriever::default());
        let engine = engine(&model, &retriever);

        let err = engine.ask("t", "q").await.unwrap_err();
        assert!(matches!(err, Error::UnknownToolRequested(_)));
        assert_eq!(committed_len(&engine, "t").await, 0);
        assert!(!engine.conversations().contains("t"));
    }

    #[tokio::test]
    async fn test_failed_first_turn_leaves_no_thread() {
        let model = Arc::new(ScriptedModel::new(vec![
            Err(Error::model("down")),
            Ok(Turn::assistant("Hi.")),
            Err(Error::model("down again")),
        ]));
        let retriever = Arc::new(FakeRetriever::default());
        let engine = engine(&model, &retriever);

        engine.ask("fresh", "hi").await.unwrap_err();
        assert!(!engine.conversations().contains("fresh"));
        assert!(engine.conversations().snapshot("fresh").await.is_none());
        assert!(engine.conversations().is_empty());

        // A thread with committed turns stays after a later failure.
        engine.ask("fresh", "hi").await.unwrap();
        engine.ask("fresh", "again").await.unwrap_err();
        assert!(engine.conversations().contains("fresh"));
        assert_eq!(committed_len(&engine, "fresh").await, 2);
    }

    #[tokio::test]
    async fn test_duplicate_call_ids_are_fatal() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(Turn::assistant_with_tool_calls(
            "",
            vec![
                ToolInvocationRequest::new("a", "retriever", json!({"query": "x"})),
                ToolInvocationRequest::new("a", "retriever", json!({"query": "y"})),
            ],
        ))]));
        let retriever = Arc::new(FakeRetriever::default());
        let engine = engine(&model, &retriever);

        let err = engine.ask("t", "q").await.unwrap_err();
        assert!(matches!(err, Error::MalformedToolCallCorrelation(_)));
        assert!(retriever.queries().is_empty());
        assert_eq!(committed_len(&engine, "t").await, 0);
    }

    #[tokio::test]
    async fn test_missing_query_argument_degrades() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(Turn::assistant_with_tool_calls(
                "",
                vec![ToolInvocationRequest::new("call_0", "retriever", json!({}))],
            )),
            Ok(Turn::assistant("I don't know.")),
        ]));
        let retriever = Arc::new(FakeRetriever::default());
        let engine = engine(&model, &retriever);

        let outcome = engine.ask("t", "q").await.unwrap();
        assert!(outcome.messages[2].content().starts_with("Retrieval failed"));
        assert!(retriever.queries().is_empty());
    }

    #[tokio::test]
    async fn test_always_policy_skips_decision() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(Turn::assistant("Paris."))]));
        let retriever = Arc::new(FakeRetriever::default().with_passage(
            "What is the capital of France?",
            "geo.pdf",
            PARIS,
        ));
        let options = EngineOptions {
            retrieval_policy: RetrievalPolicy::Always,
            ..EngineOptions::default()
        };
        let engine = engine_with(&model, &retriever, options);

        let outcome = engine.ask("t", "What is the capital of France?").await.unwrap();

        assert_eq!(model.call_count(), 1);
        assert!(model.calls()[0].1.is_empty());
        assert_eq!(retriever.queries(), vec!["What is the capital of France?".to_string()]);
        assert_eq!(
            roles(&outcome.messages),
            vec![Role::Human, Role::Assistant, Role::Tool, Role::Assistant]
        );
    }

    #[tokio::test]
    async fn test_model_timeout() {
        let model = Arc::new(
            ScriptedModel::new(vec![Ok(Turn::assistant("late"))]).with_delay(Duration::from_millis(200)),
        );
        let retriever = Arc::new(FakeRetriever::default());
        let options = EngineOptions {
            model_timeout: Duration::from_millis(20),
            ..EngineOptions::default()
        };
        let engine = engine_with(&model, &retriever, options);

        let err = engine.ask("t", "q").await.unwrap_err();
        assert!(matches!(err, Error::ModelInvocation(_)));
        assert_eq!(committed_len(&engine, "t").await, 0);
    }

    #[tokio::test]
    async fn test_cancelled_turn_commits_nothing() {
        let model = Arc::new(
            ScriptedModel::new(vec![Ok(Turn::assistant("late"))]).with_delay(Duration::from_millis(200)),
        );
        let retriever = Arc::new(FakeRetriever::default());
        let engine = engine(&model, &retriever);

        let result = tokio::time::timeout(Duration::from_millis(20), engine.ask("t", "q")).await;
        assert!(result.is_err());
        assert_eq!(committed_len(&engine, "t").await, 0);
        assert!(!engine.conversations().contains("t"));
    }

    #[tokio::test]
    async fn test_cancelled_during_generation_commits_nothing() {
        let model = Arc::new(
            ScriptedModel::new(vec![
                Ok(Turn::assistant("Hi.")),
                Ok(tool_request(&["capital of France"])),
                Ok(Turn::assistant("late")),
            ])
            .with_delay(Duration::from_millis(100)),
        );
        let retriever = Arc::new(FakeRetriever::default().with_passage("capital of France", "geo.pdf", PARIS));
        let engine = engine(&model, &retriever);
        engine.ask("t", "Hello").await.unwrap();

        // Deciding takes ~100ms, so the deadline falls inside the generation call.
        let result = tokio::time::timeout(
            Duration::from_millis(150),
            engine.ask("t", "What is the capital of France?"),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(retriever.queries(), vec!["capital of France".to_string()]);
        assert_eq!(model.call_count(), 3);
        let conversation = engine.conversations().snapshot("t").await.unwrap();
        assert_eq!(roles(conversation.turns()), vec![Role::Human, Role::Assistant]);
        assert!(conversation.turns().iter().all(|t| t.role() != Role::Tool));
    }

    #[tokio::test]
    async fn test_same_thread_turns_serialize() {
        let model = Arc::new(
            ScriptedModel::new(vec![Ok(Turn::assistant("first")), Ok(Turn::assistant("second"))])
                .with_delay(Duration::from_millis(20)),
        );
        let retriever = Arc::new(FakeRetriever::default());
        let engine = engine(&model, &retriever);

        let (a, b) = tokio::join!(engine.ask("t", "q1"), engine.ask("t", "q2"));
        a.unwrap();
        b.unwrap();

        let conversation = engine.conversations().snapshot("t").await.unwrap();
        assert_eq!(
            roles(conversation.turns()),
            vec![Role::Human, Role::Assistant, Role::Human, Role::Assistant]
        );
        // The second model call saw the first exchange.
        assert_eq!(model.calls()[1].0.len(), 3);
    }

    #[tokio::test]
    async fn test_threads_are_independent() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(Turn::assistant("a")), Ok(Turn::assistant("b"))]));
        let retriever = Arc::new(FakeRetriever::default());
        let engine = engine(&model, &retriever);

        let (a, b) = tokio::join!(engine.ask("one", "q1"), engine.ask("two", "q2"));
        assert_eq!(a.unwrap().messages.len(), 2);
        assert_eq!(b.unwrap().messages.len(), 2);
        assert!(model.calls().iter().all(|(input, _)| input.len() == 1));
    }

    #[tokio::test]
    async fn test_blank_question_rejected() {
        let model = Arc::new(ScriptedModel::default());
        let retriever = Arc::new(FakeRetriever::default());
        let engine = engine(&model, &retriever);

        let err = engine.ask("t", "   ").await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert_eq!(model.call_count(), 0);
        assert!(!engine.conversations().contains("t"));
    }

    #[tokio::test]
    async fn test_non_assistant_reply_is_model_failure() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(Turn::human("echo"))]));
        let retriever = Arc::new(FakeRetriever::default());
        let engine = engine(&model, &retriever);

        let err = engine.ask("t", "q").await.unwrap_err();
        assert!(matches!(err, Error::ModelInvocation(_)));
    }
}

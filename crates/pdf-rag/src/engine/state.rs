//! Engine states and the checks that decide a transition out of DECIDING

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::types::{ToolInvocationRequest, Turn};

/// Where an invocation is in its lifecycle
#[derive(Debug, Clone, PartialEq)]
pub enum EngineState {
    /// The model chooses between answering and calling a tool
    Deciding,
    /// Requests of the latest assistant turn are being executed
    Retrieving { requests: Vec<ToolInvocationRequest> },
    /// The final answer is produced from curated context
    Generating,
    /// Terminal, holding the final assistant turn
    Done(Turn),
}

impl EngineState {
    pub fn name(&self) -> &'static str {
        match self {
            EngineState::Deciding => "deciding",
            EngineState::Retrieving { .. } => "retrieving",
            EngineState::Generating => "generating",
            EngineState::Done(_) => "done",
        }
    }
}

/// Next state after the model's DECIDING reply.
///
/// A reply without tool calls is the answer. Otherwise every request must
/// name `registered_tool` and carry a non-empty id unique within the turn.
pub fn after_decision(reply: &Turn, registered_tool: &str) -> Result<EngineState> {
    if !reply.is_tool_request() {
        return Ok(EngineState::Done(reply.clone()));
    }

    if let Some(unknown) = reply
        .tool_calls()
        .iter()
        .find(|call| call.name != registered_tool)
    {
        return Err(Error::UnknownToolRequested(unknown.name.clone()));
    }

    validate_request_ids(reply.tool_calls())?;

    Ok(EngineState::Retrieving {
        requests: reply.tool_calls().to_vec(),
    })
}

/// Request ids must be non-empty and unique within one assistant turn
pub fn validate_request_ids(requests: &[ToolInvocationRequest]) -> Result<()> {
    let mut seen = HashSet::new();
    for request in requests {
        if request.id.trim().is_empty() {
            return Err(Error::correlation(format!(
                "request for '{}' has an empty id",
                request.name
            )));
        }
        if !seen.insert(request.id.as_str()) {
            return Err(Error::correlation(format!(
                "request id '{}' is used more than once",
                request.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::tool_request;
    use serde_json::json;

    #[test]
    fn test_answer_goes_to_done() {
        let reply = Turn::assistant("Hello!");
        assert_eq!(
            after_decision(&reply, "retriever").unwrap(),
            EngineState::Done(reply)
        );
    }

    #[test]
    fn test_tool_request_goes_to_retrieving() {
        let reply = tool_request(&["a", "b"]);
        match after_decision(&reply, "retriever").unwrap() {
            EngineState::Retrieving { requests } => {
                let ids: Vec<_> = requests.iter().map(|r| r.id.as_str()).collect();
                assert_eq!(ids, vec!["call_0", "call_1"]);
            }
            other => panic!("unexpected state {}", other.name()),
        }
    }

    #[test]
    fn test_unknown_tool() {
        let reply = Turn::assistant_with_tool_calls(
            "",
            vec![
                ToolInvocationRequest::new("1", "retriever", json!({"query": "x"})),
                ToolInvocationRequest::new("2", "web_search", json!({})),
            ],
        );
        let err = after_decision(&reply, "retriever").unwrap_err();
        assert!(matches!(err, Error::UnknownToolRequested(name) if name == "web_search"));
    }

    #[test]
    fn test_bad_ids() {
        let dup = Turn::assistant_with_tool_calls(
            "",
            vec![
                ToolInvocationRequest::new("x", "retriever", json!({"query": "a"})),
                ToolInvocationRequest::new("x", "retriever", json!({"query": "b"})),
            ],
        );
        assert!(matches!(
            after_decision(&dup, "retriever"),
            Err(Error::MalformedToolCallCorrelation(_))
        ));

        let empty = Turn::assistant_with_tool_calls(
            "",
            vec![ToolInvocationRequest::new(" ", "retriever", json!({"query": "a"}))],
        );
        assert!(validate_request_ids(empty.tool_calls()).is_err());
    }
}

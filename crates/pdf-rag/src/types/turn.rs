//! Conversation turns and tool invocation requests

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Assistant,
    Tool,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Human => "human",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A model-issued request to run a registered tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationRequest {
    /// Correlation id, unique within one assistant turn
    pub id: String,
    /// Registered tool name
    pub name: String,
    /// Arguments keyed by parameter name
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ToolInvocationRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// String argument by name, if present
    pub fn str_argument(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }
}

/// One message in a conversation.
///
/// Fields are private: a turn cannot change after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ToolInvocationRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl Turn {
    fn build(
        role: Role,
        content: String,
        tool_calls: Vec<ToolInvocationRequest>,
        tool_call_id: Option<String>,
    ) -> Self {
        Self {
            role,
            content,
            tool_calls,
            tool_call_id,
            created_at: Utc::now(),
        }
    }

    /// A user question
    pub fn human(content: impl Into<String>) -> Self {
        Self::build(Role::Human, content.into(), Vec::new(), None)
    }

    /// A final assistant answer
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::build(Role::Assistant, content.into(), Vec::new(), None)
    }

    /// An assistant turn carrying tool invocation requests
    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<ToolInvocationRequest>,
    ) -> Self {
        Self::build(Role::Assistant, content.into(), tool_calls, None)
    }

    /// The output of one tool invocation
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::build(Role::Tool, content.into(), Vec::new(), Some(tool_call_id.into()))
    }

    /// A system instruction
    pub fn system(content: impl Into<String>) -> Self {
        Self::build(Role::System, content.into(), Vec::new(), None)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn tool_calls(&self) -> &[ToolInvocationRequest] {
        &self.tool_calls
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        self.tool_call_id.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Assistant turn that only asks for tools
    pub fn is_tool_request(&self) -> bool {
        self.role == Role::Assistant && !self.tool_calls.is_empty()
    }

    /// Assistant turn that answers the user
    pub fn is_final_answer(&self) -> bool {
        self.role == Role::Assistant && self.tool_calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_request_classification() {
        let call = ToolInvocationRequest::new("call_0", "retriever", json!({"query": "paris"}));
        let request = Turn::assistant_with_tool_calls("", vec![call]);
        assert!(request.is_tool_request());
        assert!(!request.is_final_answer());

        let answer = Turn::assistant("Paris.");
        assert!(answer.is_final_answer());
        assert!(!Turn::human("hi").is_final_answer());
    }

    #[test]
    fn test_serialized_shape() {
        let turn = Turn::tool("call_0", "Content:x");
        let value = serde_json::to_value(&turn).unwrap();
        assert_eq!(value["role"], "tool");
        assert_eq!(value["tool_call_id"], "call_0");
        assert!(value.get("tool_calls").is_none());

        let human = serde_json::to_value(Turn::human("q")).unwrap();
        assert!(human.get("tool_call_id").is_none());
    }

    #[test]
    fn test_str_argument() {
        let call = ToolInvocationRequest::new("1", "retriever", json!({"query": "x", "k": 2}));
        assert_eq!(call.str_argument("query"), Some("x"));
        assert_eq!(call.str_argument("k"), None);
        assert_eq!(call.str_argument("missing"), None);
    }
}

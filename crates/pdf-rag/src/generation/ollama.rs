//! Ollama client for tool-calling chat and embeddings

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::{EmbeddingConfig, LlmConfig};
use crate::error::{Error, Result};
use crate::types::{Role, ToolInvocationRequest, ToolSpec, Turn};

/// Ollama API client.
///
/// Embedding requests are retried with exponential backoff. Chat requests are
/// not: a failed generation is reported to the caller as-is.
pub struct OllamaClient {
    /// HTTP client
    client: Client,
    /// Chat configuration
    config: LlmConfig,
    /// Embedding model name
    embed_model: String,
    /// Maximum embedding retries
    max_retries: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    /// Id of the request a tool message answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    /// Function a tool message answers, as Ollama correlates tool results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    function: WireFunctionCall,
}

#[derive(Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolSpec,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: WireMessage,
}

#[derive(Serialize)]
struct EmbedRequest {
    model: String,
    prompt: String,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(config: &LlmConfig, embeddings: &EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: config.clone(),
            embed_model: embeddings.model.clone(),
            max_retries: embeddings.max_retries,
        })
    }

    /// Chat model name
    pub fn chat_model(&self) -> &str {
        &self.config.chat_model
    }

    /// Retry a request with exponential backoff
    async fn retry_request<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        let delay = Duration::from_secs(2u64.pow(attempt));
                        tracing::warn!(
                            "Request failed (attempt {}/{}), retrying in {:?}",
                            attempt + 1,
                            self.max_retries + 1,
                            delay
                        );
                        sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::embedding("Unknown error")))
    }

    /// Check if Ollama is available
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.config.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// Generate an embedding using Ollama with retry
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.config.base_url);
        let text = text.to_string();
        let model = self.embed_model.clone();
        let client = self.client.clone();

        self.retry_request(|| {
            let url = url.clone();
            let text = text.clone();
            let model = model.clone();
            let client = client.clone();

            async move {
                let request = EmbedRequest {
                    model,
                    prompt: text,
                };

                let response = client
                    .post(&url)
                    .json(&request)
                    .send()
                    .await
                    .map_err(|e| Error::embedding(format!("Embedding request failed: {}", e)))?;

                if !response.status().is_success() {
                    return Err(Error::embedding(format!(
                        "Embedding failed: HTTP {}",
                        response.status()
                    )));
                }

                let embed_response: EmbedResponse = response.json().await.map_err(|e| {
                    Error::embedding(format!("Failed to parse embedding response: {}", e))
                })?;

                Ok(embed_response.embedding)
            }
        })
        .await
    }

    /// Run one chat completion, advertising `tools` to the model
    pub async fn chat(&self, messages: &[Turn], tools: &[ToolSpec]) -> Result<Turn> {
        let url = format!("{}/api/chat", self.config.base_url);
        let request = ChatRequest {
            model: &self.config.chat_model,
            messages: to_wire_messages(messages),
            tools: tools
                .iter()
                .map(|spec| WireTool {
                    kind: "function",
                    function: spec,
                })
                .collect(),
            stream: false,
            options: GenerateOptions {
                temperature: self.config.temperature,
            },
        };

        tracing::debug!(
            "Chat request: model={}, messages={}, tools={}",
            self.config.chat_model,
            messages.len(),
            tools.len()
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::model(format!("Chat request timed out: {}", e))
                } else {
                    Error::model(format!("Chat request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::model(format!("Chat failed: HTTP {} - {}", status, body)));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::model(format!("Failed to parse chat response: {}", e)))?;

        Ok(from_wire(chat_response.message))
    }
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::Human => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
        Role::System => "system",
    }
}

/// Wire messages for a transcript. Tool messages carry the id and function
/// name of the request they answer.
fn to_wire_messages(messages: &[Turn]) -> Vec<WireMessage> {
    let mut requested: HashMap<&str, &str> = HashMap::new();
    messages
        .iter()
        .map(|turn| {
            for call in turn.tool_calls() {
                requested.insert(call.id.as_str(), call.name.as_str());
            }
            let mut wire = to_wire(turn);
            if let Some(id) = turn.tool_call_id() {
                wire.tool_name = requested.get(id).map(|name| name.to_string());
                wire.tool_call_id = Some(id.to_string());
            }
            wire
        })
        .collect()
}

fn to_wire(turn: &Turn) -> WireMessage {
    WireMessage {
        role: wire_role(turn.role()).to_string(),
        content: turn.content().to_string(),
        tool_calls: turn
            .tool_calls()
            .iter()
            .map(|call| WireToolCall {
                id: Some(call.id.clone()),
                function: WireFunctionCall {
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                },
            })
            .collect(),
        tool_call_id: None,
        tool_name: None,
    }
}

/// Convert the model's reply into an assistant turn. Ollama may omit call ids,
/// in which case positional `call_<n>` ids are assigned.
fn from_wire(message: WireMessage) -> Turn {
    if message.tool_calls.is_empty() {
        return Turn::assistant(message.content);
    }

    let calls = message
        .tool_calls
        .into_iter()
        .enumerate()
        .map(|(index, call)| {
            let id = call
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| format!("call_{}", index));
            ToolInvocationRequest::new(id, call.function.name, normalize_arguments(call.function.arguments))
        })
        .collect();

    Turn::assistant_with_tool_calls(message.content, calls)
}

/// Some OpenAI-compatible servers send arguments as a JSON string
fn normalize_arguments(arguments: serde_json::Value) -> serde_json::Value {
    match arguments {
        serde_json::Value::String(raw) => {
            serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
        }
        serde_json::Value::Null => serde_json::json!({}),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reply_without_tool_calls() {
        let message: WireMessage =
            serde_json::from_value(json!({"role": "assistant", "content": "Paris."})).unwrap();
        let turn = from_wire(message);
        assert!(turn.is_final_answer());
        assert_eq!(turn.content(), "Paris.");
    }

    #[test]
    fn test_reply_with_tool_calls_assigns_ids() {
        let message: WireMessage = serde_json::from_value(json!({
            "role": "assistant",
            "content": "",
            "tool_calls": [
                {"function": {"name": "retriever", "arguments": {"query": "capital"}}},
                {"function": {"name": "retriever", "arguments": "{\"query\": \"france\"}"}}
            ]
        }))
        .unwrap();

        let turn = from_wire(message);
        let calls = turn.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_0");
        assert_eq!(calls[1].id, "call_1");
        assert_eq!(calls[1].str_argument("query"), Some("france"));
    }

    #[test]
    fn test_turn_roles_on_the_wire() {
        let wire = to_wire(&Turn::human("hi"));
        assert_eq!(wire.role, "user");

        let call = ToolInvocationRequest::new("abc", "retriever", json!({"query": "q"}));
        let wire = to_wire(&Turn::assistant_with_tool_calls("", vec![call]));
        let value = serde_json::to_value(&wire).unwrap();
        assert_eq!(value["tool_calls"][0]["id"], "abc");
        assert_eq!(value["tool_calls"][0]["function"]["arguments"]["query"], "q");
    }

    #[test]
    fn test_tool_results_name_their_request() {
        let transcript = vec![
            Turn::human("What is the capital of France?"),
            Turn::assistant_with_tool_calls(
                "",
                vec![ToolInvocationRequest::new("call_0", "retriever", json!({"query": "capital"}))],
            ),
            Turn::tool("call_0", "Source:{'source': 'geo.pdf'}\nContent:Paris"),
            Turn::tool("call_9", "orphan"),
        ];

        let wire = serde_json::to_value(to_wire_messages(&transcript)).unwrap();
        assert_eq!(wire[2]["role"], "tool");
        assert_eq!(wire[2]["tool_call_id"], "call_0");
        assert_eq!(wire[2]["tool_name"], "retriever");
        assert_eq!(wire[3]["tool_call_id"], "call_9");
        assert!(wire[3].get("tool_name").is_none());
        assert!(wire[0].get("tool_call_id").is_none());
        assert!(wire[1].get("tool_name").is_none());
    }

    #[test]
    fn test_tools_serialize_as_functions() {
        let spec = ToolSpec::single_string_param("retriever", "Retrieve", "query", "Search text");
        let tool = WireTool {
            kind: "function",
            function: &spec,
        };
        let value = serde_json::to_value(&tool).unwrap();
        assert_eq!(value["type"], "function");
        assert_eq!(value["function"]["name"], "retriever");
        assert_eq!(value["function"]["parameters"]["required"][0], "query");
    }
}

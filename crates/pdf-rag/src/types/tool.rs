//! Tool declarations advertised to the chat model

use serde::{Deserialize, Serialize};

/// A capability the model may invoke
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Name the model uses in its invocation requests
    pub name: String,
    /// Natural-language description shown to the model
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: serde_json::Value,
}

impl ToolSpec {
    /// Tool taking a single required string parameter
    pub fn single_string_param(
        name: impl Into<String>,
        description: impl Into<String>,
        param: &str,
        param_description: &str,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    param: {
                        "type": "string",
                        "description": param_description,
                    }
                },
                "required": [param],
            }),
        }
    }
}

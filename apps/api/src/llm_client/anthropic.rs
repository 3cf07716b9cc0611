//! Anthropic Messages API backend.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{send_with_retry, GeneratorError, TextGenerator, ToolCall, ToolSpec, HTTP_TIMEOUT};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Default model; override with `ANTHROPIC_MODEL`.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<AnthropicTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct AnthropicTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
    pub name: Option<String>,
    pub input: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl AnthropicResponse {
    /// Text of the first text block.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }

    /// First `tool_use` block as a `ToolCall`.
    pub fn tool_call(&self) -> Option<ToolCall> {
        self.content
            .iter()
            .find(|b| b.block_type == "tool_use")
            .and_then(|b| {
                Some(ToolCall {
                    name: b.name.clone()?,
                    arguments: b.input.clone().unwrap_or(Value::Null),
                })
            })
    }

    fn stop_reason(&self) -> &str {
        self.stop_reason.as_deref().unwrap_or("unknown")
    }

    /// Reply text, empty when there is no text block. The orchestrator's validation
    /// turns an empty reply into a correctable extraction failure.
    fn reply_text(&self) -> String {
        match self.text() {
            Some(text) => text.to_string(),
            None => {
                warn!("Anthropic returned no text (stop reason: {})", self.stop_reason());
                String::new()
            }
        }
    }

    fn reply_tool_call(&self) -> Result<ToolCall, GeneratorError> {
        self.tool_call().ok_or_else(|| {
            GeneratorError::Unavailable(format!(
                "Anthropic returned no tool_use block (stop reason: {})",
                self.stop_reason()
            ))
        })
    }
}

#[derive(Clone)]
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(api_key: String, model: String) -> Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .context("Failed to build HTTP client")?,
            api_key,
            model,
        })
    }

    async fn call(&self, request: &AnthropicRequest<'_>) -> Result<AnthropicResponse, GeneratorError> {
        let response = send_with_retry(self.backend(), || {
            self.client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(request)
                .send()
        })
        .await?;

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| GeneratorError::Fatal(format!("malformed Anthropic response: {e}")))?;

        debug!(
            "Anthropic call succeeded: input_tokens={}, output_tokens={}",
            parsed.usage.input_tokens, parsed.usage.output_tokens
        );
        Ok(parsed)
    }
}

#[async_trait]
impl TextGenerator for AnthropicClient {
    fn backend(&self) -> &'static str {
        "anthropic"
    }

    async fn generate(&self, system: &str, user: &str) -> Result<String, GeneratorError> {
        let request = AnthropicRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: user,
            }],
            tools: vec![],
            tool_choice: None,
        };

        Ok(self.call(&request).await?.reply_text())
    }

    async fn generate_with_tools(
        &self,
        system: &str,
        user: &str,
        tools: &[ToolSpec],
    ) -> Result<ToolCall, GeneratorError> {
        let request = AnthropicRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: user,
            }],
            tools: tools
                .iter()
                .map(|t| AnthropicTool {
                    name: &t.name,
                    description: &t.description,
                    input_schema: &t.parameters,
                })
                .collect(),
            tool_choice: Some(serde_json::json!({ "type": "any" })),
        };

        self.call(&request).await?.reply_tool_call()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_text_picks_first_text_block() {
        let response: AnthropicResponse = serde_json::from_value(json!({
            "content": [
                {"type": "thinking"},
                {"type": "text", "text": "{\"job_title\": \"SRE\"}"}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 5}
        }))
        .unwrap();
        assert_eq!(response.text(), Some("{\"job_title\": \"SRE\"}"));
        assert!(response.tool_call().is_none());
    }

    #[test]
    fn test_response_tool_call_reads_tool_use_block() {
        let response: AnthropicResponse = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "Calling tool"},
                {"type": "tool_use", "id": "toolu_1", "name": "generate_job_description",
                 "input": {"job_title": "SRE"}}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 5}
        }))
        .unwrap();
        let call = response.tool_call().unwrap();
        assert_eq!(call.name, "generate_job_description");
        assert_eq!(call.arguments, json!({"job_title": "SRE"}));
    }

    #[test]
    fn test_reply_without_content_is_not_fatal() {
        let response: AnthropicResponse = serde_json::from_value(json!({
            "content": [],
            "stop_reason": "max_tokens",
            "usage": {"input_tokens": 10, "output_tokens": 4096}
        }))
        .unwrap();
        assert_eq!(response.reply_text(), "");
        assert!(matches!(
            response.reply_tool_call(),
            Err(GeneratorError::Unavailable(ref m)) if m.contains("max_tokens")
        ));
    }

    #[test]
    fn test_request_serializes_tools_as_input_schema() {
        let schema = json!({"type": "object"});
        let request = AnthropicRequest {
            model: DEFAULT_MODEL,
            max_tokens: MAX_TOKENS,
            system: "sys",
            messages: vec![AnthropicMessage {
                role: "user",
                content: "hi",
            }],
            tools: vec![AnthropicTool {
                name: "t",
                description: "d",
                input_schema: &schema,
            }],
            tool_choice: Some(json!({"type": "any"})),
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["tools"][0]["input_schema"], schema);
        assert_eq!(body["tool_choice"]["type"], "any");
    }

    #[test]
    fn test_plain_request_omits_tool_fields() {
        let request = AnthropicRequest {
            model: DEFAULT_MODEL,
            max_tokens: MAX_TOKENS,
            system: "sys",
            messages: vec![],
            tools: vec![],
            tool_choice: None,
        };
        let body = serde_json::to_value(&request).unwrap();
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }
}

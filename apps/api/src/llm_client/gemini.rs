//! Gemini `generateContent` backend.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{send_with_retry, GeneratorError, TextGenerator, ToolCall, ToolSpec, HTTP_TIMEOUT};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
/// Default model; override with `GEMINI_MODEL`.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    system_instruction: GeminiContent,
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<GeminiFunctionCall>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<UsageMetadata>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: GeminiContent,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

impl GeminiResponse {
    fn parts(&self) -> impl Iterator<Item = &GeminiPart> {
        self.candidates
            .first()
            .into_iter()
            .flat_map(|c| c.content.parts.iter())
    }

    /// Concatenated text parts of the first candidate.
    fn text(&self) -> Option<String> {
        let text: String = self.parts().filter_map(|p| p.text.as_deref()).collect();
        (!text.is_empty()).then_some(text)
    }

    fn tool_call(&self) -> Option<ToolCall> {
        self.parts()
            .find_map(|p| p.function_call.as_ref())
            .map(|f| ToolCall {
                name: f.name.clone(),
                arguments: f.args.clone(),
            })
    }

    /// Why the reply ended, e.g. `SAFETY`, `MAX_TOKENS` or a prompt block reason.
    fn stop_reason(&self) -> &str {
        self.candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref())
            .or_else(|| {
                self.prompt_feedback
                    .as_ref()
                    .and_then(|f| f.block_reason.as_deref())
            })
            .unwrap_or("unknown")
    }

    /// Reply text, empty when the model produced none (safety block, recitation,
    /// token limit). An empty reply fails validation and is corrected like any
    /// other bad output.
    fn reply_text(&self) -> String {
        self.text().unwrap_or_else(|| {
            warn!("Gemini returned no text (finish reason: {})", self.stop_reason());
            String::new()
        })
    }

    /// A missing function call is a transient backend condition, not a request error.
    fn reply_tool_call(&self) -> Result<ToolCall, GeneratorError> {
        self.tool_call().ok_or_else(|| {
            GeneratorError::Unavailable(format!(
                "Gemini returned no function call (finish reason: {})",
                self.stop_reason()
            ))
        })
    }
}

fn text_content(role: Option<&str>, text: &str) -> GeminiContent {
    GeminiContent {
        role: role.map(str::to_string),
        parts: vec![GeminiPart {
            text: Some(text.to_string()),
            function_call: None,
        }],
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
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

    async fn call(&self, request: &GeminiRequest) -> Result<GeminiResponse, GeneratorError> {
        let url = format!("{GEMINI_API_BASE}/{}:generateContent", self.model);
        let response = send_with_retry(self.backend(), || {
            self.client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(request)
                .send()
        })
        .await?;

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| GeneratorError::Fatal(format!("malformed Gemini response: {e}")))?;

        if let Some(usage) = &parsed.usage_metadata {
            debug!(
                "Gemini call succeeded: prompt_tokens={}, candidate_tokens={}",
                usage.prompt_token_count, usage.candidates_token_count
            );
        }
        Ok(parsed)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    fn backend(&self) -> &'static str {
        "gemini"
    }

    async fn generate(&self, system: &str, user: &str) -> Result<String, GeneratorError> {
        let request = GeminiRequest {
            system_instruction: text_content(None, system),
            contents: vec![text_content(Some("user"), user)],
            generation_config: Some(json!({ "responseMimeType": "application/json" })),
            tools: None,
            tool_config: None,
        };

        Ok(self.call(&request).await?.reply_text())
    }

    async fn generate_with_tools(
        &self,
        system: &str,
        user: &str,
        tools: &[ToolSpec],
    ) -> Result<ToolCall, GeneratorError> {
        let declarations: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                })
            })
            .collect();

        let request = GeminiRequest {
            system_instruction: text_content(None, system),
            contents: vec![text_content(Some("user"), user)],
            generation_config: None,
            tools: Some(json!([{ "functionDeclarations": declarations }])),
            tool_config: Some(json!({ "functionCallingConfig": { "mode": "ANY" } })),
        };

        self.call(&request).await?.reply_tool_call()
    }
}

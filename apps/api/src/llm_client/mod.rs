//! LLM client: the single point of entry for every generative backend call.
//!
//! ARCHITECTURAL RULE: No other module may talk to a model provider directly.
//! Callers depend on `TextGenerator`; concrete backends live in submodules.
//!
//! Each backend makes ONE logical call per `generate`. The only retry here is a
//! small transport-level retry for transient failures (connect errors, timeouts,
//! 429, 5xx). Output validation and self-correction belong to `jd::orchestrator`.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

pub mod anthropic;
pub mod gemini;
pub mod prompts;

pub use anthropic::AnthropicClient;
pub use gemini::GeminiClient;

/// Attempts per logical call at the transport layer.
const MAX_TRANSPORT_ATTEMPTS: u32 = 3;
const TRANSPORT_BACKOFF_BASE_MS: u64 = 1000;
pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeneratorError {
    /// Transient: the backend could not be reached or is overloaded. Retryable.
    #[error("generator unavailable: {0}")]
    Unavailable(String),

    /// Terminal: auth failure, bad request, malformed response. Not retryable.
    #[error("generator failed: {0}")]
    Fatal(String),
}

/// A tool (function) the model may call, declared with a JSON schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// The model's invocation of a declared tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
}

/// Text-generation capability. Implement this to add a backend without touching
/// the orchestrator, handlers, or state.
///
/// Held by `JdOrchestrator` as `Arc<dyn TextGenerator>`.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Short backend identifier for logs.
    fn backend(&self) -> &'static str;

    /// Single-shot generation. Returns the raw text of the model's reply.
    async fn generate(&self, system: &str, user: &str) -> Result<String, GeneratorError>;

    /// Single-shot generation constrained to calling one of `tools`.
    async fn generate_with_tools(
        &self,
        _system: &str,
        _user: &str,
        _tools: &[ToolSpec],
    ) -> Result<ToolCall, GeneratorError> {
        Err(GeneratorError::Fatal(format!(
            "backend '{}' does not support tool calling",
            self.backend()
        )))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transport retry
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatusClass {
    Success,
    Transient,
    Terminal,
}

pub(crate) fn classify_status(status: StatusCode) -> StatusClass {
    if status.is_success() {
        StatusClass::Success
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        StatusClass::Transient
    } else {
        StatusClass::Terminal
    }
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: String,
}

/// Pulls `error.message` out of a provider error body, falling back to the raw body.
/// Both Anthropic and Gemini use this envelope.
pub(crate) fn provider_error_message(body: String) -> String {
    serde_json::from_str::<ProviderError>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body)
}

/// Sends a request built by `send`, retrying transient failures with
/// exponential backoff (1s, 2s). Returns the first successful response.
pub(crate) async fn send_with_retry<F, Fut>(
    backend: &str,
    mut send: F,
) -> Result<Response, GeneratorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Response, reqwest::Error>>,
{
    let mut last_error = String::from("no attempt made");

    for attempt in 0..MAX_TRANSPORT_ATTEMPTS {
        if attempt > 0 {
            let delay = Duration::from_millis(TRANSPORT_BACKOFF_BASE_MS * (1 << (attempt - 1)));
            warn!(
                "{} call attempt {} failed ({}), retrying after {}ms...",
                backend,
                attempt,
                last_error,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }

        let response = match send().await {
            Ok(r) => r,
            Err(e) if e.is_connect() || e.is_timeout() => {
                last_error = format!("transport error: {e}");
                continue;
            }
            Err(e) => return Err(GeneratorError::Fatal(format!("{backend} request failed: {e}"))),
        };

        let status = response.status();
        match classify_status(status) {
            StatusClass::Success => return Ok(response),
            StatusClass::Transient => {
                let body = response.text().await.unwrap_or_default();
                last_error = format!("status {}: {}", status.as_u16(), provider_error_message(body));
            }
            StatusClass::Terminal => {
                let body = response.text().await.unwrap_or_default();
                return Err(GeneratorError::Fatal(format!(
                    "{backend} API error (status {}): {}",
                    status.as_u16(),
                    provider_error_message(body)
                )));
            }
        }
    }

    Err(GeneratorError::Unavailable(format!(
        "{backend} unavailable after {MAX_TRANSPORT_ATTEMPTS} attempts: {last_error}"
    )))
}

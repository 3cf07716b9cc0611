//! Test doubles shared across module tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::jd::schema::JD_TOOL_NAME;
use crate::llm_client::{GeneratorError, TextGenerator, ToolCall, ToolSpec};

/// A fully valid JD as the model would return it.
pub fn complete_jd_json() -> String {
    json!({
        "job_title": "Backend Engineer",
        "job_summary": "Builds and operates the order-processing services.",
        "key_responsibilities": ["Design APIs", "Own the on-call rotation"],
        "required_skills": ["Go", "SQL"],
        "preferred_qualifications": ["Kubernetes experience"],
        "tools_and_technologies": ["PostgreSQL", "Docker"],
        "work_environment": "Hybrid",
        "reporting_structure": "Reports to the Engineering Manager"
    })
    .to_string()
}

/// Replays scripted replies in order; the last reply repeats once the script runs out.
pub struct ScriptedGenerator {
    text_replies: Mutex<VecDeque<Result<String, GeneratorError>>>,
    tool_replies: Mutex<VecDeque<Result<Value, GeneratorError>>>,
    calls: Mutex<Vec<(String, String)>>,
    tools_seen: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<Result<String, GeneratorError>>) -> Self {
        Self {
            text_replies: Mutex::new(replies.into()),
            tool_replies: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            tools_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn always(reply: Result<String, GeneratorError>) -> Self {
        Self::new(vec![reply])
    }

    pub fn with_tool_calls(replies: Vec<Result<Value, GeneratorError>>) -> Self {
        let generator = Self::new(vec![]);
        *generator.tool_replies.lock().unwrap() = replies.into();
        generator
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn declared_tools(&self) -> Vec<String> {
        self.tools_seen.lock().unwrap().clone()
    }

    fn next<T: Clone>(queue: &Mutex<VecDeque<Result<T, GeneratorError>>>) -> Result<T, GeneratorError> {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(GeneratorError::Fatal("script is empty".to_string())))
        }
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn backend(&self) -> &'static str {
        "scripted"
    }

    async fn generate(&self, system: &str, user: &str) -> Result<String, GeneratorError> {
        self.calls
            .lock()
            .unwrap()
            .push((system.to_string(), user.to_string()));
        Self::next(&self.text_replies)
    }

    async fn generate_with_tools(
        &self,
        system: &str,
        user: &str,
        tools: &[ToolSpec],
    ) -> Result<ToolCall, GeneratorError> {
        self.calls
            .lock()
            .unwrap()
            .push((system.to_string(), user.to_string()));
        self.tools_seen
            .lock()
            .unwrap()
            .extend(tools.iter().map(|t| t.name.clone()));
        Self::next(&self.tool_replies).map(|arguments| ToolCall {
            name: JD_TOOL_NAME.to_string(),
            arguments,
        })
    }
}

//! The ordered question set driving intake, and typing of raw answers.
//!
//! The set is static configuration: the built-in default, or a JSON file named by
//! `INTAKE_QUESTIONS_PATH`, loaded once at startup.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::intake::profile::AnswerValue;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    #[default]
    Text,
    Integer,
    List,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub field: String,
    pub prompt: String,
    #[serde(default)]
    pub kind: AnswerKind,
}

impl Question {
    pub fn new(field: &str, prompt: &str, kind: AnswerKind) -> Self {
        Self {
            field: field.to_string(),
            prompt: prompt.to_string(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct QuestionSet {
    questions: Vec<Question>,
}

impl QuestionSet {
    /// Rejects an empty set and duplicate field names.
    pub fn new(questions: Vec<Question>) -> Result<Self> {
        if questions.is_empty() {
            bail!("question set must contain at least one question");
        }
        let mut seen = HashSet::new();
        for q in &questions {
            if q.field.trim().is_empty() {
                bail!("question '{}' has an empty field name", q.prompt);
            }
            if !seen.insert(q.field.as_str()) {
                bail!("duplicate question field '{}'", q.field);
            }
        }
        Ok(Self { questions })
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read question set from {}", path.display()))?;
        let questions: Vec<Question> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid question set JSON in {}", path.display()))?;
        Self::new(questions)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Question> {
        self.questions.iter()
    }

    /// Finds a question by field name, or by exact (trimmed, case-insensitive) prompt text.
    pub fn find(&self, key: &str) -> Option<&Question> {
        let key = key.trim();
        self.questions
            .iter()
            .find(|q| q.field == key)
            .or_else(|| {
                self.questions
                    .iter()
                    .find(|q| q.prompt.trim().eq_ignore_ascii_case(key))
            })
    }
}

impl Default for QuestionSet {
    fn default() -> Self {
        use AnswerKind::{Integer, List, Text};
        Self {
            questions: vec![
                Question::new("current_role", "What is your current role or designation?", Text),
                Question::new("department", "Which department do you work in?", Text),
                Question::new("experience", "How many years of experience do you have?", Integer),
                Question::new("responsibilities", "Describe your main responsibilities.", List),
                Question::new("tools", "Which tools or technologies do you use?", List),
                Question::new("skills", "What skills are required for your role?", List),
                Question::new("leadership", "Do you mentor or lead others?", Text),
                Question::new("reporting_to", "Who do you report to?", Text),
                Question::new("work_type", "Is your role remote, hybrid or onsite?", Text),
                Question::new("achievements", "What are your key achievements?", List),
            ],
        }
    }
}

/// Why a raw answer could not be typed for its question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerFormatError {
    pub field: String,
    pub message: String,
}

/// Types a raw answer according to the question's declared kind.
pub fn parse_answer(question: &Question, raw: &str) -> Result<AnswerValue, AnswerFormatError> {
    let fail = |message: String| AnswerFormatError {
        field: question.field.clone(),
        message,
    };
    let trimmed = raw.trim();

    match question.kind {
        AnswerKind::Text => {
            if trimmed.is_empty() {
                return Err(fail("answer must not be empty".to_string()));
            }
            Ok(AnswerValue::Text(trimmed.to_string()))
        }
        AnswerKind::Integer => trimmed
            .parse::<i64>()
            .map(AnswerValue::Integer)
            .map_err(|_| fail(format!("expected a whole number, got '{trimmed}'"))),
        AnswerKind::List => {
            let items: Vec<String> = trimmed
                .split([',', ';', '\n'])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if items.is_empty() {
                return Err(fail("expected at least one item".to_string()));
            }
            Ok(AnswerValue::List(items))
        }
    }
}

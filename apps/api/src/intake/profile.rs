use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One collected answer, already typed per its question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Integer(i64),
    Text(String),
    List(Vec<String>),
}

/// Answers collected during one intake session, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Profile(BTreeMap<String, AnswerValue>);

impl Profile {
    pub fn get(&self, field: &str) -> Option<&AnswerValue> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn insert(&mut self, field: &str, value: AnswerValue) {
        self.0.insert(field.to_string(), value);
    }

    /// Pretty JSON used to parameterize the generation prompt.
    pub fn to_prompt_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

//! Schema contract: the required shape of a generated job description.
//!
//! The field table below is the single source of truth: shape validation walks it,
//! semantic validation walks it, and the tool declaration handed to tool-calling
//! backends is derived from it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::llm_client::ToolSpec;

/// Name of the tool declared to backends that support function calling.
pub const JD_TOOL_NAME: &str = "generate_job_description";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    TextList,
    Projects,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

const fn field(name: &'static str, kind: FieldKind, required: bool) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required,
    }
}

pub const JD_FIELDS: &[FieldSpec] = &[
    field("job_title", FieldKind::Text, true),
    field("job_summary", FieldKind::Text, true),
    field("key_responsibilities", FieldKind::TextList, true),
    field("required_skills", FieldKind::TextList, true),
    field("preferred_qualifications", FieldKind::TextList, true),
    field("tools_and_technologies", FieldKind::TextList, true),
    field("work_environment", FieldKind::Text, true),
    field("reporting_structure", FieldKind::Text, true),
    field("seniority", FieldKind::Text, false),
    field("leadership", FieldKind::Text, false),
    field("achievements", FieldKind::Text, false),
    field("projects", FieldKind::Projects, false),
];

// ────────────────────────────────────────────────────────────────────────────
// Artifact types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub technologies: Vec<String>,
}

/// A validated job description. Only `validation::validate_semantics` builds one
/// from model output, so every required field is populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptionArtifact {
    pub job_title: String,
    pub job_summary: String,
    pub key_responsibilities: Vec<String>,
    pub required_skills: Vec<String>,
    pub preferred_qualifications: Vec<String>,
    pub tools_and_technologies: Vec<String>,
    pub work_environment: String,
    pub reporting_structure: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seniority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leadership: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub achievements: Option<String>,
    /// `Some(vec![])` and `None` stay distinct so an explicit empty list round-trips.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects: Option<Vec<Project>>,
}

/// Output of shape validation: types are right, content is not yet judged.
/// Absent and `null` fields are both `None`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ShapedJd {
    pub job_title: Option<String>,
    pub job_summary: Option<String>,
    pub key_responsibilities: Option<Vec<String>>,
    pub required_skills: Option<Vec<String>>,
    pub preferred_qualifications: Option<Vec<String>>,
    pub tools_and_technologies: Option<Vec<String>>,
    pub work_environment: Option<String>,
    pub reporting_structure: Option<String>,
    pub seniority: Option<String>,
    pub leadership: Option<String>,
    pub achievements: Option<String>,
    pub projects: Option<Vec<Project>>,
}

/// One field that failed a check, with a human-readable problem statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub problem: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, problem: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            problem: problem.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("shape error: {}", summarize(.0))]
pub struct ShapeError(pub Vec<FieldViolation>);

/// Joins violations into `field: problem; field: problem`.
pub fn summarize(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.field, v.problem))
        .collect::<Vec<_>>()
        .join("; ")
}

// ────────────────────────────────────────────────────────────────────────────
// Shape validation
// ────────────────────────────────────────────────────────────────────────────

/// Strict structural check of a candidate against `JD_FIELDS`.
///
/// No coercion: a number is not a string and a string is not a list. Unknown keys
/// are ignored. Every violated field is reported, not just the first.
pub fn validate_shape(candidate: &Value) -> Result<ShapedJd, ShapeError> {
    let Some(object) = candidate.as_object() else {
        return Err(ShapeError(vec![FieldViolation::new(
            "<root>",
            format!("expected a JSON object, found {}", type_name(candidate)),
        )]));
    };

    let violations: Vec<FieldViolation> = JD_FIELDS
        .iter()
        .flat_map(|spec| check_field(spec, object))
        .collect();

    if !violations.is_empty() {
        return Err(ShapeError(violations));
    }

    serde_json::from_value(candidate.clone())
        .map_err(|e| ShapeError(vec![FieldViolation::new("<root>", e.to_string())]))
}

fn check_field(spec: &FieldSpec, object: &Map<String, Value>) -> Vec<FieldViolation> {
    let value = match object.get(spec.name) {
        None | Some(Value::Null) => return vec![],
        Some(v) => v,
    };

    match spec.kind {
        FieldKind::Text => {
            if value.is_string() {
                vec![]
            } else {
                vec![FieldViolation::new(
                    spec.name,
                    format!("expected a string, found {}", type_name(value)),
                )]
            }
        }
        FieldKind::TextList => check_string_list(spec.name, value),
        FieldKind::Projects => check_projects(spec.name, value),
    }
}

fn check_string_list(name: &str, value: &Value) -> Vec<FieldViolation> {
    let Some(items) = value.as_array() else {
        return vec![FieldViolation::new(
            name,
            format!("expected a list of strings, found {}", type_name(value)),
        )];
    };
    items
        .iter()
        .enumerate()
        .filter(|(_, item)| !item.is_string())
        .map(|(i, item)| {
            FieldViolation::new(
                format!("{name}[{i}]"),
                format!("expected a string, found {}", type_name(item)),
            )
        })
        .collect()
}

fn check_projects(name: &str, value: &Value) -> Vec<FieldViolation> {
    let Some(items) = value.as_array() else {
        return vec![FieldViolation::new(
            name,
            format!("expected a list of project objects, found {}", type_name(value)),
        )];
    };

    let mut violations = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let path = format!("{name}[{i}]");
        let Some(project) = item.as_object() else {
            violations.push(FieldViolation::new(
                &path,
                format!("expected an object, found {}", type_name(item)),
            ));
            continue;
        };
        for key in ["title", "description"] {
            match project.get(key) {
                Some(Value::String(_)) => {}
                Some(other) => violations.push(FieldViolation::new(
                    format!("{path}.{key}"),
                    format!("expected a string, found {}", type_name(other)),
                )),
                None => violations.push(FieldViolation::new(
                    format!("{path}.{key}"),
                    "is missing",
                )),
            }
        }
        if let Some(tech) = project.get("technologies") {
            violations.extend(check_string_list(&format!("{path}.technologies"), tech));
        }
    }
    violations
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tool declaration
// ────────────────────────────────────────────────────────────────────────────

/// JSON-schema tool declaration derived from `JD_FIELDS`.
pub fn tool_spec() -> ToolSpec {
    let mut properties = Map::new();
    for spec in JD_FIELDS {
        let schema = match spec.kind {
            FieldKind::Text => json!({ "type": "string" }),
            FieldKind::TextList => json!({ "type": "array", "items": { "type": "string" } }),
            FieldKind::Projects => json!({
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "description": { "type": "string" },
                        "technologies": { "type": "array", "items": { "type": "string" } }
                    },
                    "required": ["title", "description"]
                }
            }),
        };
        properties.insert(spec.name.to_string(), schema);
    }

    let required: Vec<&str> = JD_FIELDS
        .iter()
        .filter(|s| s.required)
        .map(|s| s.name)
        .collect();

    ToolSpec {
        name: JD_TOOL_NAME.to_string(),
        description: "Generate a structured, ATS-friendly job description".to_string(),
        parameters: json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    }
}

//! Validation pipeline: extract → shape → semantics.
//!
//! Every failure renders to one line naming all violated fields, which the
//! orchestrator feeds back into the next prompt verbatim.

use serde_json::Value;
use thiserror::Error;

use crate::jd::extraction::{extract_structured, ExtractionError};
use crate::jd::schema::{
    summarize, validate_shape, FieldViolation, JobDescriptionArtifact, ShapeError, ShapedJd,
};

/// Shape-valid but a required field is missing, empty, or holds an empty item.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("semantic error: {}", summarize(.0))]
pub struct SemanticError(pub Vec<FieldViolation>);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error(transparent)]
    Semantic(#[from] SemanticError),
}

impl ValidationError {
    /// Every field named by this failure. Empty for extraction failures.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            ValidationError::Extraction(_) => vec![],
            ValidationError::Shape(ShapeError(v)) | ValidationError::Semantic(SemanticError(v)) => {
                v.iter().map(|f| f.field.as_str()).collect()
            }
        }
    }
}

/// Validates raw model output into a job description.
pub fn validate(raw_text: &str) -> Result<JobDescriptionArtifact, ValidationError> {
    let value = extract_structured(raw_text)?;
    validate_value(&value)
}

/// Validates an already-structured value (e.g. tool-call arguments).
pub fn validate_value(value: &Value) -> Result<JobDescriptionArtifact, ValidationError> {
    let shaped = validate_shape(value)?;
    Ok(validate_semantics(shaped)?)
}

/// Enforces the non-empty invariants that shape validation leaves open.
pub fn validate_semantics(shaped: ShapedJd) -> Result<JobDescriptionArtifact, SemanticError> {
    let mut violations = Vec::new();

    let job_title = required_text("job_title", shaped.job_title, &mut violations);
    let job_summary = required_text("job_summary", shaped.job_summary, &mut violations);
    let key_responsibilities = required_list(
        "key_responsibilities",
        shaped.key_responsibilities,
        &mut violations,
    );
    let required_skills = required_list("required_skills", shaped.required_skills, &mut violations);
    let preferred_qualifications = required_list(
        "preferred_qualifications",
        shaped.preferred_qualifications,
        &mut violations,
    );
    let tools_and_technologies = required_list(
        "tools_and_technologies",
        shaped.tools_and_technologies,
        &mut violations,
    );
    let work_environment =
        required_text("work_environment", shaped.work_environment, &mut violations);
    let reporting_structure = required_text(
        "reporting_structure",
        shaped.reporting_structure,
        &mut violations,
    );

    if !violations.is_empty() {
        return Err(SemanticError(violations));
    }

    Ok(JobDescriptionArtifact {
        job_title,
        job_summary,
        key_responsibilities,
        required_skills,
        preferred_qualifications,
        tools_and_technologies,
        work_environment,
        reporting_structure,
        seniority: shaped.seniority,
        leadership: shaped.leadership,
        achievements: shaped.achievements,
        projects: shaped.projects,
    })
}

fn required_text(
    field: &str,
    value: Option<String>,
    violations: &mut Vec<FieldViolation>,
) -> String {
    match value {
        None => {
            violations.push(FieldViolation::new(field, "is missing"));
            String::new()
        }
        Some(s) if s.trim().is_empty() => {
            violations.push(FieldViolation::new(field, "must not be empty"));
            s
        }
        Some(s) => s,
    }
}

fn required_list(
    field: &str,
    value: Option<Vec<String>>,
    violations: &mut Vec<FieldViolation>,
) -> Vec<String> {
    let Some(items) = value else {
        violations.push(FieldViolation::new(field, "is missing"));
        return vec![];
    };
    if items.is_empty() {
        violations.push(FieldViolation::new(
            field,
            "must contain at least one item (found an empty list)",
        ));
    }
    for (i, item) in items.iter().enumerate() {
        if item.trim().is_empty() {
            violations.push(FieldViolation::new(
                format!("{field}[{i}]"),
                "must not be empty",
            ));
        }
    }
    items
}

// Prompt constants for JD generation.
// Reuses cross-cutting fragments from llm_client::prompts.

use crate::llm_client::prompts::{JSON_ONLY_SYSTEM, OUTPUT_CONSTRAINTS};

/// System prompt prefix; `JSON_ONLY_SYSTEM` is appended by `system_instruction()`.
const JD_SYSTEM_ROLE: &str = "You are an expert HR writer producing professional, \
    ATS-friendly job descriptions from structured employee interview answers. \
    Use only the facts in the profile; generalize them into role-level language.";

/// JD generation prompt. Replace `{profile}` before sending.
pub const JD_USER_TEMPLATE: &str = r#"Create a job description for the role described by this employee profile:

{profile}

Return a JSON object with this EXACT schema:
{
  "job_title": "Backend Engineer",
  "job_summary": "Two to four sentences describing the purpose of the role.",
  "key_responsibilities": ["..."],
  "required_skills": ["..."],
  "preferred_qualifications": ["..."],
  "tools_and_technologies": ["..."],
  "work_environment": "Remote | Hybrid | Onsite, with a short description",
  "reporting_structure": "Who the role reports to and who reports to it",
  "seniority": "Junior | Mid | Senior | Lead",
  "leadership": "Mentoring or leadership expectations",
  "achievements": "Representative achievements expected in the role",
  "projects": [
    {"title": "...", "description": "...", "technologies": ["..."]}
  ]
}

RULES:
1. Every field up to and including "reporting_structure" is REQUIRED and must be non-empty.
2. Every list must contain at least one item.
3. "seniority", "leadership", "achievements" and "projects" are optional; omit them when the profile gives no basis."#;

/// Appended to the base user prompt after a failed attempt.
/// Replace `{failure}` and `{constraints}` before sending.
pub const CORRECTION_TEMPLATE: &str = r#"

CORRECTION REQUIRED: your previous response was rejected.
Validation failure:
{failure}

Fix every problem listed above and respond again. Output constraints:
{constraints}"#;

pub fn system_instruction() -> String {
    format!("{JD_SYSTEM_ROLE} {JSON_ONLY_SYSTEM}")
}

pub fn user_instruction(profile_json: &str) -> String {
    JD_USER_TEMPLATE.replace("{profile}", profile_json)
}

/// Base prompt plus a correction block quoting `failure` verbatim.
pub fn corrective_instruction(base: &str, failure: &str) -> String {
    let block = CORRECTION_TEMPLATE
        .replace("{constraints}", OUTPUT_CONSTRAINTS)
        .replace("{failure}", failure);
    format!("{base}{block}")
}

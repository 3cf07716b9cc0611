// Shared prompt fragments.
// Each module that calls a generator defines its own prompts.rs alongside it;
// this file holds only the cross-cutting pieces.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with a single valid JSON object only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Restatement of output constraints appended to every corrective prompt.
pub const OUTPUT_CONSTRAINTS: &str = "\
    - Return ONLY the JSON object: no prose before or after it, no markdown fences.\n\
    - Include EVERY required field.\n\
    - Required text fields must be non-empty strings.\n\
    - Required list fields must be JSON arrays with at least one non-empty string.";

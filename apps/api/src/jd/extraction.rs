//! Recovers a JSON value from raw model output.
//!
//! Models wrap JSON in prose or markdown fences often enough that a plain
//! `serde_json::from_str` is not sufficient.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("extraction error: {0}")]
pub struct ExtractionError(pub String);

/// Parses `raw_text` directly as an object, falling back to the first balanced
/// `{...}` block that parses.
pub fn extract_structured(raw_text: &str) -> Result<Value, ExtractionError> {
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(raw_text.trim()) {
        return Ok(value);
    }

    let mut closes = HashMap::new();
    let mut from = 0;
    while let Some(offset) = raw_text[from..].find('{') {
        let start = from + offset;
        let end = match closes.get(&start).copied() {
            Some(end) => end,
            None => scan_from(raw_text, start, &mut closes),
        };
        if let Some(end) = end {
            if let Ok(value @ Value::Object(_)) =
                serde_json::from_str::<Value>(&raw_text[start..end])
            {
                return Ok(value);
            }
        }
        // Retry from the next opening brace, even one inside the rejected candidate.
        from = start + 1;
    }

    Err(ExtractionError("no structured object found".to_string()))
}

/// Scans the object opening at `start` and returns its end offset (exclusive).
///
/// Every brace opened outside a string literal during the scan is recorded in
/// `closes` with its own end (or `None` if it never closes). A scan starting at
/// one of those braces would see the same string state and stop at the same `}`,
/// so each of them is resolved here and never rescanned. Braces inside string
/// literals are skipped and get their own scan only if they become candidates.
fn scan_from(
    text: &str,
    start: usize,
    closes: &mut HashMap<usize, Option<usize>>,
) -> Option<usize> {
    let mut open: Vec<usize> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => open.push(start + offset),
            '}' => {
                if let Some(opened) = open.pop() {
                    let end = start + offset + 1;
                    closes.insert(opened, Some(end));
                    if open.is_empty() {
                        return Some(end);
                    }
                }
            }
            _ => {}
        }
    }

    for opened in open {
        closes.insert(opened, None);
    }
    None
}

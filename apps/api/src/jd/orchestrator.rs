//! Self-correcting JD generation.
//!
//! Flow per attempt: generator call → validation → (on failure) corrective prompt
//! + exponential backoff. Stops at the first valid artifact or when the attempt
//! budget is spent.
//!
//! Generator outcomes:
//! - `Unavailable` consumes one attempt; the prompt is not rewritten since the
//!   model never answered.
//! - `Fatal` aborts immediately without consuming the remaining budget.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::jd::prompts::{corrective_instruction, system_instruction, user_instruction};
use crate::jd::schema::{tool_spec, JobDescriptionArtifact, JD_TOOL_NAME};
use crate::jd::validation::{validate, validate_value, ValidationError};
use crate::llm_client::{GeneratorError, TextGenerator};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(1500);

// ────────────────────────────────────────────────────────────────────────────
// Policy and records
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }
}

impl RetryPolicy {
    /// A budget of zero is raised to one.
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    /// Delay after failed attempt `attempt` (1-based): base × 2^(attempt-1).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_base.saturating_mul(factor)
    }
}

/// How the generator is asked to produce the artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Free text reply, JSON extracted from it.
    #[default]
    Text,
    /// Forced call of the `generate_job_description` tool; arguments are the artifact.
    ToolCall,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Accepted,
    Rejected(ValidationError),
    Unavailable(String),
}

/// One round of generation. Lives only as long as the orchestrator call that made it.
#[derive(Debug, Clone)]
pub struct GenerationAttempt {
    pub number: u32,
    pub system_instruction: String,
    pub user_instruction: String,
    pub raw_output: Option<String>,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub artifact: JobDescriptionArtifact,
    pub attempts: Vec<GenerationAttempt>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    /// The model kept producing invalid output after every correction.
    #[error("generation failed after {attempts} attempts: {last_error}")]
    Exhausted {
        attempts: u32,
        last_error: ValidationError,
    },

    /// The final attempt could not reach the backend.
    #[error("generator unavailable after {attempts} attempts: {message}")]
    Unavailable { attempts: u32, message: String },

    #[error("generator failed on attempt {attempt}: {message}")]
    Fatal { attempt: u32, message: String },

    #[error("generation timed out after {0:?}")]
    TimedOut(Duration),
}

// ────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct JdOrchestrator {
    generator: Arc<dyn TextGenerator>,
    policy: RetryPolicy,
    mode: OutputMode,
}

impl JdOrchestrator {
    pub fn new(generator: Arc<dyn TextGenerator>, policy: RetryPolicy, mode: OutputMode) -> Self {
        Self {
            generator,
            policy,
            mode,
        }
    }

    /// Generates a JD for a serialized profile using the standard prompts.
    pub async fn generate(&self, profile_json: &str) -> Result<GenerationReport, GenerationError> {
        self.run(&system_instruction(), &user_instruction(profile_json))
            .await
    }

    /// Drives up to `max_attempts` generator calls, feeding each validation
    /// failure back into the next prompt.
    pub async fn run(
        &self,
        system: &str,
        base_user: &str,
    ) -> Result<GenerationReport, GenerationError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts: Vec<GenerationAttempt> = Vec::new();
        let mut user = base_user.to_string();
        let mut last_failure: Option<AttemptOutcome> = None;

        for number in 1..=max_attempts {
            if number > 1 {
                let delay = self.policy.backoff_for(number - 1);
                info!("Retrying JD generation in {}ms", delay.as_millis());
                tokio::time::sleep(delay).await;
            }

            let (raw_output, outcome) = match self.produce(system, &user).await {
                Ok((raw, Ok(artifact))) => {
                    info!(
                        "JD generated on attempt {}/{} via {}",
                        number,
                        max_attempts,
                        self.generator.backend()
                    );
                    attempts.push(GenerationAttempt {
                        number,
                        system_instruction: system.to_string(),
                        user_instruction: user,
                        raw_output: Some(raw),
                        outcome: AttemptOutcome::Accepted,
                    });
                    return Ok(GenerationReport { artifact, attempts });
                }
                Ok((raw, Err(e))) => (Some(raw), AttemptOutcome::Rejected(e)),
                Err(GeneratorError::Unavailable(message)) => {
                    (None, AttemptOutcome::Unavailable(message))
                }
                Err(GeneratorError::Fatal(message)) => {
                    warn!("JD generation aborted on attempt {number}: {message}");
                    return Err(GenerationError::Fatal {
                        attempt: number,
                        message,
                    });
                }
            };

            let next_user = match &outcome {
                AttemptOutcome::Rejected(e) => {
                    warn!(
                        "JD attempt {}/{} rejected (fields: [{}]): {}",
                        number,
                        max_attempts,
                        e.fields().join(", "),
                        e
                    );
                    corrective_instruction(base_user, &e.to_string())
                }
                AttemptOutcome::Unavailable(message) => {
                    warn!(
                        "JD attempt {}/{}: generator unavailable: {}",
                        number, max_attempts, message
                    );
                    user.clone()
                }
                AttemptOutcome::Accepted => user.clone(),
            };

            attempts.push(GenerationAttempt {
                number,
                system_instruction: system.to_string(),
                user_instruction: std::mem::replace(&mut user, next_user),
                raw_output,
                outcome: outcome.clone(),
            });
            last_failure = Some(outcome);
        }

        Err(match last_failure {
            Some(AttemptOutcome::Rejected(last_error)) => GenerationError::Exhausted {
                attempts: max_attempts,
                last_error,
            },
            Some(AttemptOutcome::Unavailable(message)) => GenerationError::Unavailable {
                attempts: max_attempts,
                message,
            },
            Some(AttemptOutcome::Accepted) | None => GenerationError::Unavailable {
                attempts: max_attempts,
                message: "no generation attempt completed".to_string(),
            },
        })
    }

    /// One generator call plus validation of whatever it produced.
    async fn produce(
        &self,
        system: &str,
        user: &str,
    ) -> Result<(String, Result<JobDescriptionArtifact, ValidationError>), GeneratorError> {
        match self.mode {
            OutputMode::Text => {
                let raw = self.generator.generate(system, user).await?;
                let checked = validate(&raw);
                Ok((raw, checked))
            }
            OutputMode::ToolCall => {
                let call = self
                    .generator
                    .generate_with_tools(system, user, &[tool_spec()])
                    .await?;
                if call.name != JD_TOOL_NAME {
                    warn!("Generator called unexpected tool '{}'", call.name);
                }
                let checked = validate_value(&call.arguments);
                Ok((call.arguments.to_string(), checked))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{complete_jd_json, ScriptedGenerator};
    use serde_json::json;
    use tokio::time::Instant;

    const INVALID: &str = r#"{"job_title": "Backend Engineer", "key_responsibilities": []}"#;

    fn orchestrator(generator: Arc<ScriptedGenerator>) -> JdOrchestrator {
        JdOrchestrator::new(generator, RetryPolicy::default(), OutputMode::Text)
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_millis(1500));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(3000));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(6000));
    }

    #[test]
    fn test_zero_budget_is_raised_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_valid_output_returns_without_retry() {
        let generator = Arc::new(ScriptedGenerator::always(Ok(complete_jd_json())));
        let start = Instant::now();

        let report = orchestrator(generator.clone()).generate("{}").await.unwrap();

        assert_eq!(report.artifact.job_title, "Backend Engineer");
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(generator.call_count(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_invalid_exhausts_after_exactly_n_calls() {
        let generator = Arc::new(ScriptedGenerator::always(Ok(INVALID.to_string())));
        let start = Instant::now();

        let err = orchestrator(generator.clone()).generate("{}").await.unwrap_err();

        match err {
            GenerationError::Exhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.fields().contains(&"key_responsibilities"));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
        assert_eq!(generator.call_count(), 3);
        // 1.5s + 3s; no sleep after the final attempt.
        assert_eq!(start.elapsed(), Duration::from_millis(4500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_second_attempt_sleeps_once_for_base_delay() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Ok("not json at all".to_string()),
            Ok(complete_jd_json()),
        ]));
        let start = Instant::now();

        let report = orchestrator(generator.clone()).generate("{}").await.unwrap();

        assert_eq!(generator.call_count(), 2);
        assert_eq!(report.attempts.len(), 2);
        assert!(matches!(report.attempts[0].outcome, AttemptOutcome::Rejected(_)));
        assert_eq!(report.attempts[1].outcome, AttemptOutcome::Accepted);
        assert_eq!(report.artifact.required_skills, vec!["Go", "SQL"]);
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_reply_is_corrected_not_fatal() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Ok(String::new()),
            Ok(complete_jd_json()),
        ]));

        let report = orchestrator(generator.clone()).generate("{}").await.unwrap();

        assert_eq!(report.attempts.len(), 2);
        assert!(matches!(
            report.attempts[0].outcome,
            AttemptOutcome::Rejected(ValidationError::Extraction(_))
        ));
        assert!(generator.calls()[1]
            .1
            .contains("extraction error: no structured object found"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrective_prompt_quotes_previous_failure() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Ok(INVALID.to_string()),
            Ok(r#"{"job_title": 7}"#.to_string()),
            Ok(complete_jd_json()),
        ]));

        orchestrator(generator.clone()).generate("{}").await.unwrap();

        let calls = generator.calls();
        let first_failure = validate(INVALID).unwrap_err().to_string();
        let second_failure = validate(r#"{"job_title": 7}"#).unwrap_err().to_string();

        assert!(!calls[0].1.contains("CORRECTION REQUIRED"));
        assert!(calls[1].1.contains(&first_failure));
        assert!(calls[2].1.contains(&second_failure));
        assert!(!calls[2].1.contains(&first_failure));
        // System instruction is stable across attempts.
        assert!(calls.iter().all(|(system, _)| system == &calls[0].0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_generator_error_aborts_immediately() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Ok(INVALID.to_string()),
            Err(GeneratorError::Fatal("invalid api key".to_string())),
            Ok(complete_jd_json()),
        ]));

        let err = orchestrator(generator.clone()).generate("{}").await.unwrap_err();

        assert_eq!(
            err,
            GenerationError::Fatal {
                attempt: 2,
                message: "invalid api key".to_string()
            }
        );
        assert_eq!(generator.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_consumes_an_attempt_without_rewriting_prompt() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Err(GeneratorError::Unavailable("503".to_string())),
            Ok(complete_jd_json()),
        ]));
        let start = Instant::now();

        let report = orchestrator(generator.clone()).generate("{}").await.unwrap();

        let calls = generator.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, calls[1].1);
        assert!(matches!(
            report.attempts[0].outcome,
            AttemptOutcome::Unavailable(_)
        ));
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_on_final_attempt_is_distinct_from_exhausted() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Ok(INVALID.to_string()),
            Ok(INVALID.to_string()),
            Err(GeneratorError::Unavailable("connection refused".to_string())),
        ]));

        let err = orchestrator(generator).generate("{}").await.unwrap_err();

        assert!(matches!(
            err,
            GenerationError::Unavailable { attempts: 3, ref message } if message == "connection refused"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_budget_is_respected() {
        let generator = Arc::new(ScriptedGenerator::always(Ok(INVALID.to_string())));
        let orchestrator = JdOrchestrator::new(
            generator.clone(),
            RetryPolicy::new(5, Duration::from_millis(10)),
            OutputMode::Text,
        );
        let start = Instant::now();

        let err = orchestrator.generate("{}").await.unwrap_err();

        assert!(matches!(err, GenerationError::Exhausted { attempts: 5, .. }));
        assert_eq!(generator.call_count(), 5);
        assert_eq!(start.elapsed(), Duration::from_millis(10 + 20 + 40 + 80));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_mode_validates_tool_arguments() {
        let args: serde_json::Value = serde_json::from_str(&complete_jd_json()).unwrap();
        let generator = Arc::new(ScriptedGenerator::with_tool_calls(vec![
            Ok(json!({ "job_title": "Backend Engineer" })),
            Ok(args),
        ]));
        let orchestrator =
            JdOrchestrator::new(generator.clone(), RetryPolicy::default(), OutputMode::ToolCall);

        let report = orchestrator.generate("{}").await.unwrap();

        assert_eq!(report.attempts.len(), 2);
        assert_eq!(report.artifact.work_environment, "Hybrid");
        let tools = generator.declared_tools();
        assert_eq!(tools[0], JD_TOOL_NAME);
        assert!(generator.calls()[1].1.contains("job_summary: is missing"));
    }
}

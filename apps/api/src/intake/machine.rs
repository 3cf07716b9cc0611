//! Intake state machine.
//!
//! collecting ──answer──▶ collecting | ready ──generate──▶ generated ──approve──▶ approved
//!
//! A failed generation leaves the session in `ready`. `generated` and `approved`
//! are terminal for answers; `approved` is terminal for everything.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::intake::profile::Profile;
use crate::intake::questions::{parse_answer, AnswerFormatError, Question, QuestionSet};
use crate::jd::orchestrator::GenerationError;
use crate::models::intake::JdStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeState {
    Collecting,
    Ready,
    Generated,
    Approved,
}

impl IntakeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntakeState::Collecting => "collecting",
            IntakeState::Ready => "ready",
            IntakeState::Generated => "generated",
            IntakeState::Approved => "approved",
        }
    }
}

impl fmt::Display for IntakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("invalid answer for '{field}': {message}")]
    AnswerFormat { field: String, message: String },

    #[error("cannot {action} a session that is {state}")]
    InvalidTransition {
        state: IntakeState,
        action: &'static str,
    },

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl From<AnswerFormatError> for IntakeError {
    fn from(e: AnswerFormatError) -> Self {
        IntakeError::AnswerFormat {
            field: e.field,
            message: e.message,
        }
    }
}

/// One intake session: the question set, the answers so far, and the status of
/// the most recent job description (if any).
#[derive(Debug, Clone)]
pub struct IntakeSession<'q> {
    questions: &'q QuestionSet,
    profile: Profile,
    jd_status: Option<JdStatus>,
}

impl<'q> IntakeSession<'q> {
    pub fn new(questions: &'q QuestionSet, profile: Profile, jd_status: Option<JdStatus>) -> Self {
        Self {
            questions,
            profile,
            jd_status,
        }
    }

    pub fn state(&self) -> IntakeState {
        match self.jd_status {
            Some(JdStatus::Approved) => IntakeState::Approved,
            Some(JdStatus::Generated) => IntakeState::Generated,
            None if self.next_question().is_none() => IntakeState::Ready,
            None => IntakeState::Collecting,
        }
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn total(&self) -> usize {
        self.questions.len()
    }

    /// Number of configured questions that have an answer.
    pub fn answered(&self) -> usize {
        self.questions
            .iter()
            .filter(|q| self.profile.contains(&q.field))
            .count()
    }

    /// First unanswered question and its 1-based step number.
    pub fn next_question(&self) -> Option<(usize, &'q Question)> {
        self.questions
            .iter()
            .enumerate()
            .find(|(_, q)| !self.profile.contains(&q.field))
            .map(|(i, q)| (i + 1, q))
    }

    /// Stores `raw` against the next unanswered question.
    ///
    /// A format error leaves the session unchanged.
    pub fn submit_answer(&mut self, raw: &str) -> Result<IntakeState, IntakeError> {
        let state = self.state();
        let question = match (state, self.next_question()) {
            (IntakeState::Collecting, Some((_, q))) => q,
            _ => {
                return Err(IntakeError::InvalidTransition {
                    state,
                    action: "answer",
                })
            }
        };

        let value = parse_answer(question, raw)?;
        self.profile.insert(&question.field, value);
        Ok(self.state())
    }

    /// Stores answers addressed by field name or question text.
    ///
    /// All-or-nothing: if any pair is rejected, nothing is stored. Allowed while
    /// collecting or ready; earlier answers to the same field are replaced.
    pub fn submit_batch<'a, I>(&mut self, pairs: I) -> Result<IntakeState, IntakeError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let state = self.state();
        if !matches!(state, IntakeState::Collecting | IntakeState::Ready) {
            return Err(IntakeError::InvalidTransition {
                state,
                action: "answer",
            });
        }

        let mut staged = self.profile.clone();
        for (key, raw) in pairs {
            let question = self
                .questions
                .find(key)
                .ok_or_else(|| IntakeError::AnswerFormat {
                    field: key.to_string(),
                    message: "no such question".to_string(),
                })?;
            staged.insert(&question.field, parse_answer(question, raw)?);
        }

        self.profile = staged;
        Ok(self.state())
    }

    /// Snapshot of the profile to hand to generation. Only valid when ready.
    pub fn begin_generation(&self) -> Result<Profile, IntakeError> {
        self.require(IntakeState::Ready, "generate")?;
        Ok(self.profile.clone())
    }

    pub fn mark_generated(&mut self) -> Result<IntakeState, IntakeError> {
        self.require(IntakeState::Ready, "generate")?;
        self.jd_status = Some(JdStatus::Generated);
        Ok(self.state())
    }

    /// Re-approving an approved session is an error, not a no-op.
    pub fn approve(&mut self) -> Result<IntakeState, IntakeError> {
        self.require(IntakeState::Generated, "approve")?;
        self.jd_status = Some(JdStatus::Approved);
        Ok(self.state())
    }

    fn require(&self, expected: IntakeState, action: &'static str) -> Result<(), IntakeError> {
        let state = self.state();
        if state == expected {
            Ok(())
        } else {
            Err(IntakeError::InvalidTransition { state, action })
        }
    }
}

//! Intake operations over a session store: chat, generate, approve and lookups.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::archive::JdArchive;
use crate::intake::machine::{IntakeError, IntakeSession, IntakeState};
use crate::intake::profile::Profile;
use crate::intake::questions::QuestionSet;
use crate::jd::orchestrator::{GenerationError, GenerationReport, JdOrchestrator};
use crate::models::intake::{ChatMessage, JdStatus, Sender, StoredJd};
use crate::store::{SessionKey, SessionStore};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub qa: Vec<QaPair>,
}

/// A batch answer addressed by question text or by field name.
#[derive(Debug, Clone, Deserialize)]
pub struct QaPair {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatReply {
    Question {
        message: String,
        field: String,
        step: usize,
        total: usize,
    },
    JobDescription {
        jd_id: Uuid,
        status: JdStatus,
        attempts: u32,
        jd_json: Value,
    },
}

#[derive(Debug, Clone)]
pub struct GeneratedJd {
    pub jd: StoredJd,
    pub attempts: u32,
}

impl GeneratedJd {
    pub fn to_reply(&self) -> Result<ChatReply, IntakeError> {
        Ok(ChatReply::JobDescription {
            jd_id: self.jd.id,
            status: self.jd.status,
            attempts: self.attempts,
            jd_json: serde_json::to_value(&self.jd.jd_json)
                .context("Failed to serialize job description")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Approval {
    pub jd: StoredJd,
    /// Object key of the archived Markdown copy, when archiving is enabled and succeeded.
    pub archive_key: Option<String>,
}

pub struct IntakeService {
    store: Arc<dyn SessionStore>,
    orchestrator: JdOrchestrator,
    questions: Arc<QuestionSet>,
    generation_timeout: Duration,
    archive: Option<JdArchive>,
}

impl IntakeService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        orchestrator: JdOrchestrator,
        questions: Arc<QuestionSet>,
        generation_timeout: Duration,
        archive: Option<JdArchive>,
    ) -> Self {
        Self {
            store,
            orchestrator,
            questions,
            generation_timeout,
            archive,
        }
    }

    pub fn questions(&self) -> &QuestionSet {
        &self.questions
    }

    /// One conversational turn.
    ///
    /// Batch answers are applied first, then the message. Once every question is
    /// answered the JD is generated in the same turn. Messages are only recorded
    /// for turns that are accepted.
    pub async fn chat(&self, key: &SessionKey, req: ChatRequest) -> Result<ChatReply, IntakeError> {
        let mut session = self.load_session(key).await?;
        let message = req
            .message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty());

        if matches!(session.state(), IntakeState::Generated | IntakeState::Approved) {
            return Err(IntakeError::InvalidTransition {
                state: session.state(),
                action: "chat with",
            });
        }

        let mut answered = false;
        if !req.qa.is_empty() {
            let pairs = req
                .qa
                .iter()
                .map(|p| {
                    p.question
                        .as_deref()
                        .or(p.field.as_deref())
                        .map(|k| (k, p.answer.as_str()))
                        .ok_or_else(|| IntakeError::AnswerFormat {
                            field: String::new(),
                            message: "each qa entry needs a question or a field".to_string(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            session.submit_batch(pairs)?;
            answered = true;
        }

        if let Some(text) = message {
            // In `ready` a message is a nudge to (re)try generation, not an answer.
            if session.state() == IntakeState::Collecting {
                session.submit_answer(text)?;
                answered = true;
            }
        }

        if answered {
            self.store.save_profile(key, session.profile()).await?;
            debug!(
                "{key}: {}/{} questions answered",
                session.answered(),
                session.total()
            );
        }
        if let Some(text) = message {
            self.store.append_message(key, Sender::User, text).await?;
        }

        match session.next_question() {
            Some((step, question)) => {
                // Re-asking the same pending question is not a new message.
                if answered || self.store.history(key).await?.is_empty() {
                    self.store
                        .append_message(key, Sender::Agent, &question.prompt)
                        .await?;
                }
                Ok(ChatReply::Question {
                    message: question.prompt.clone(),
                    field: question.field.clone(),
                    step,
                    total: session.total(),
                })
            }
            None => self.generate_from(key, session).await?.to_reply(),
        }
    }

    /// Explicit (re)generation for a session whose questions are all answered.
    pub async fn generate(&self, key: &SessionKey) -> Result<GeneratedJd, IntakeError> {
        let session = self.load_session(key).await?;
        self.generate_from(key, session).await
    }

    pub async fn approve(&self, key: &SessionKey) -> Result<Approval, IntakeError> {
        let latest = self.store.latest_jd(key).await?;
        let profile = self.store.load_profile(key).await?;
        let mut session =
            IntakeSession::new(&self.questions, profile, latest.as_ref().map(|jd| jd.status));
        session.approve()?;

        // The state check above came from a read; the store decides the race.
        let jd_id = latest.map(|jd| jd.id).ok_or(IntakeError::InvalidTransition {
            state: IntakeState::Ready,
            action: "approve",
        })?;
        let jd = self
            .store
            .approve_jd(key, jd_id, Utc::now())
            .await?
            .ok_or(IntakeError::InvalidTransition {
                state: IntakeState::Approved,
                action: "approve",
            })?;
        info!("Approved job description {} for {key}", jd.id);

        self.store
            .append_message(key, Sender::Agent, "Job description approved.")
            .await?;

        let archive_key = match &self.archive {
            Some(archive) => match archive.upload(&jd).await {
                Ok(object_key) => Some(object_key),
                Err(e) => {
                    warn!("Failed to archive job description {}: {e:#}", jd.id);
                    None
                }
            },
            None => None,
        };

        Ok(Approval { jd, archive_key })
    }

    pub async fn latest(&self, key: &SessionKey) -> Result<Option<StoredJd>, IntakeError> {
        Ok(self.store.latest_jd(key).await?)
    }

    pub async fn history(&self, key: &SessionKey) -> Result<Vec<ChatMessage>, IntakeError> {
        Ok(self.store.history(key).await?)
    }

    async fn load_session(&self, key: &SessionKey) -> Result<IntakeSession<'_>, IntakeError> {
        let profile = self.store.load_profile(key).await?;
        let status = self.store.latest_jd(key).await?.map(|jd| jd.status);
        Ok(IntakeSession::new(&self.questions, profile, status))
    }

    async fn generate_from(
        &self,
        key: &SessionKey,
        mut session: IntakeSession<'_>,
    ) -> Result<GeneratedJd, IntakeError> {
        let profile = session.begin_generation()?;
        let report = self.run_orchestrator(key, &profile).await?;
        let attempts = report.attempts.len() as u32;
        for attempt in &report.attempts {
            debug!(
                "{key}: attempt {} {:?} (system {} chars, user {} chars, output {} chars)",
                attempt.number,
                attempt.outcome,
                attempt.system_instruction.len(),
                attempt.user_instruction.len(),
                attempt.raw_output.as_deref().map_or(0, str::len)
            );
        }

        let jd = self.store.insert_jd(key, &report.artifact).await?;
        session.mark_generated()?;
        info!(
            "Stored job description {} for {key} after {attempts} attempt(s)",
            jd.id
        );

        let rendered =
            serde_json::to_string(&jd.jd_json).context("Failed to serialize job description")?;
        self.store
            .append_message(key, Sender::Agent, &rendered)
            .await?;

        Ok(GeneratedJd { jd, attempts })
    }

    /// Runs the orchestrator under the caller-level timeout covering every attempt.
    async fn run_orchestrator(
        &self,
        key: &SessionKey,
        profile: &Profile,
    ) -> Result<GenerationReport, IntakeError> {
        let profile_json = profile
            .to_prompt_json()
            .context("Failed to serialize profile")?;

        info!("Generating job description for {key}");
        match tokio::time::timeout(
            self.generation_timeout,
            self.orchestrator.generate(&profile_json),
        )
        .await
        {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!(
                    "Job description generation for {key} timed out after {:?}",
                    self.generation_timeout
                );
                Err(GenerationError::TimedOut(self.generation_timeout).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::intake::questions::{AnswerKind, Question};
    use crate::jd::orchestrator::{OutputMode, RetryPolicy};
    use crate::llm_client::{GeneratorError, TextGenerator};
    use crate::store::MemorySessionStore;
    use crate::testing::{complete_jd_json, ScriptedGenerator};

    fn three_questions() -> Arc<QuestionSet> {
        Arc::new(
            QuestionSet::new(vec![
                Question::new("current_role", "What is your current role?", AnswerKind::Text),
                Question::new("experience", "How many years of experience?", AnswerKind::Integer),
                Question::new("skills", "Which skills matter most?", AnswerKind::List),
            ])
            .unwrap(),
        )
    }

    fn service_with(generator: Arc<dyn TextGenerator>) -> (IntakeService, Arc<MemorySessionStore>) {
        let store = Arc::new(MemorySessionStore::new());
        let orchestrator = JdOrchestrator::new(
            generator,
            RetryPolicy::new(3, Duration::from_millis(100)),
            OutputMode::Text,
        );
        let service = IntakeService::new(
            store.clone(),
            orchestrator,
            three_questions(),
            Duration::from_secs(30),
            None,
        );
        (service, store)
    }

    fn say(message: &str) -> ChatRequest {
        ChatRequest {
            message: Some(message.to_string()),
            qa: vec![],
        }
    }

    fn key() -> SessionKey {
        SessionKey::new("emp-1", "jd-1")
    }

    #[tokio::test]
    async fn test_chat_walks_questions_then_generates() {
        let generator = Arc::new(ScriptedGenerator::always(Ok(complete_jd_json())));
        let (service, _) = service_with(generator.clone());

        let first = service.chat(&key(), ChatRequest::default()).await.unwrap();
        assert!(matches!(first, ChatReply::Question { step: 1, total: 3, .. }));

        service.chat(&key(), say("Backend Engineer")).await.unwrap();
        let third = service.chat(&key(), say("5")).await.unwrap();
        match third {
            ChatReply::Question { field, step, .. } => {
                assert_eq!(field, "skills");
                assert_eq!(step, 3);
            }
            other => panic!("expected a question, got {other:?}"),
        }
        assert_eq!(generator.call_count(), 0);

        let reply = service.chat(&key(), say("Go, SQL")).await.unwrap();
        match reply {
            ChatReply::JobDescription { attempts, status, jd_json, .. } => {
                assert_eq!(attempts, 1);
                assert_eq!(status, JdStatus::Generated);
                assert_eq!(jd_json["job_title"], "Backend Engineer");
            }
            other => panic!("expected a job description, got {other:?}"),
        }

        let (_, user_prompt) = &generator.calls()[0];
        assert!(user_prompt.contains("\"experience\": 5"));

        let history = service.history(&key()).await.unwrap();
        assert_eq!(history.first().unwrap().sender, Sender::Agent);
        assert_eq!(history.iter().filter(|m| m.sender == Sender::User).count(), 3);
    }

    #[tokio::test]
    async fn test_polling_does_not_repeat_pending_question() {
        let (service, _) =
            service_with(Arc::new(ScriptedGenerator::always(Ok(complete_jd_json()))));

        service.chat(&key(), ChatRequest::default()).await.unwrap();
        service.chat(&key(), ChatRequest::default()).await.unwrap();
        let reply = service.chat(&key(), ChatRequest::default()).await.unwrap();
        assert!(matches!(reply, ChatReply::Question { step: 1, .. }));
        assert_eq!(service.history(&key()).await.unwrap().len(), 1);

        service.chat(&key(), say("Backend Engineer")).await.unwrap();
        service.chat(&key(), ChatRequest::default()).await.unwrap();

        let history = service.history(&key()).await.unwrap();
        let senders: Vec<Sender> = history.iter().map(|m| m.sender).collect();
        assert_eq!(senders, vec![Sender::Agent, Sender::User, Sender::Agent]);
    }

    #[tokio::test]
    async fn test_bad_answer_does_not_advance() {
        let (service, store) =
            service_with(Arc::new(ScriptedGenerator::always(Ok(complete_jd_json()))));
        service.chat(&key(), say("SRE")).await.unwrap();

        let err = service.chat(&key(), say("a few")).await.unwrap_err();
        assert!(matches!(err, IntakeError::AnswerFormat { ref field, .. } if field == "experience"));
        assert_eq!(store.load_profile(&key()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_batch_answers_generate_in_one_turn() {
        let (service, _) =
            service_with(Arc::new(ScriptedGenerator::always(Ok(complete_jd_json()))));
        let req = ChatRequest {
            message: None,
            qa: vec![
                QaPair {
                    question: Some("What is your current role?".to_string()),
                    field: None,
                    answer: "Data Engineer".to_string(),
                },
                QaPair {
                    question: None,
                    field: Some("experience".to_string()),
                    answer: "4".to_string(),
                },
                QaPair {
                    question: None,
                    field: Some("skills".to_string()),
                    answer: "Python; Spark".to_string(),
                },
            ],
        };

        let reply = service.chat(&key(), req).await.unwrap();
        assert!(matches!(reply, ChatReply::JobDescription { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn test_qa_entry_without_key_is_rejected() {
        let (service, _) =
            service_with(Arc::new(ScriptedGenerator::always(Ok(complete_jd_json()))));
        let req = ChatRequest {
            message: None,
            qa: vec![QaPair {
                question: None,
                field: None,
                answer: "orphan".to_string(),
            }],
        };
        assert!(matches!(
            service.chat(&key(), req).await,
            Err(IntakeError::AnswerFormat { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_generation_stays_ready_and_message_retries() {
        let bad = || Ok("I cannot help with that.".to_string());
        let generator = Arc::new(ScriptedGenerator::new(vec![
            bad(),
            bad(),
            bad(),
            Ok(complete_jd_json()),
        ]));
        let (service, _) = service_with(generator.clone());

        service.chat(&key(), say("SRE")).await.unwrap();
        service.chat(&key(), say("7")).await.unwrap();
        let err = service.chat(&key(), say("Linux")).await.unwrap_err();
        assert!(matches!(
            err,
            IntakeError::Generation(GenerationError::Exhausted { attempts: 3, .. })
        ));
        assert!(service.latest(&key()).await.unwrap().is_none());

        let reply = service.chat(&key(), say("please try again")).await.unwrap();
        assert!(matches!(reply, ChatReply::JobDescription { attempts: 1, .. }));
        assert_eq!(generator.call_count(), 4);
    }

    #[tokio::test]
    async fn test_approve_lifecycle() {
        let (service, _) =
            service_with(Arc::new(ScriptedGenerator::always(Ok(complete_jd_json()))));

        let err = service.approve(&key()).await.unwrap_err();
        assert!(matches!(
            err,
            IntakeError::InvalidTransition {
                state: IntakeState::Collecting,
                ..
            }
        ));

        for answer in ["SRE", "3", "Go"] {
            service.chat(&key(), say(answer)).await.unwrap();
        }
        let approval = service.approve(&key()).await.unwrap();
        assert_eq!(approval.jd.status, JdStatus::Approved);
        assert!(approval.jd.approved_at.is_some());
        assert!(approval.archive_key.is_none());

        let again = service.approve(&key()).await.unwrap_err();
        assert!(matches!(
            again,
            IntakeError::InvalidTransition {
                state: IntakeState::Approved,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_chat_after_generation_is_invalid_transition() {
        let (service, _) =
            service_with(Arc::new(ScriptedGenerator::always(Ok(complete_jd_json()))));
        for answer in ["SRE", "3", "Go"] {
            service.chat(&key(), say(answer)).await.unwrap();
        }
        let err = service.chat(&key(), say("one more thing")).await.unwrap_err();
        assert!(matches!(
            err,
            IntakeError::InvalidTransition {
                state: IntakeState::Generated,
                ..
            }
        ));
        assert!(matches!(
            service.generate(&key()).await,
            Err(IntakeError::InvalidTransition { .. })
        ));
    }

    struct StalledGenerator;

    #[async_trait]
    impl TextGenerator for StalledGenerator {
        fn backend(&self) -> &'static str {
            "stalled"
        }

        async fn generate(&self, _system: &str, _user: &str) -> Result<String, GeneratorError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(complete_jd_json())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_times_out() {
        let (service, _) = service_with(Arc::new(StalledGenerator));
        for answer in ["SRE", "3"] {
            service.chat(&key(), say(answer)).await.unwrap();
        }
        let err = service.chat(&key(), say("Go")).await.unwrap_err();
        assert!(matches!(
            err,
            IntakeError::Generation(GenerationError::TimedOut(d)) if d == Duration::from_secs(30)
        ));
    }
}

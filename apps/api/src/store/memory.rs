use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{SessionKey, SessionStore};
use crate::intake::profile::Profile;
use crate::jd::schema::JobDescriptionArtifact;
use crate::models::intake::{ChatMessage, JdStatus, Sender, StoredJd};

#[derive(Debug, Default)]
struct SessionRecord {
    profile: Profile,
    history: Vec<ChatMessage>,
    jds: Vec<StoredJd>,
}

/// Process-local store used when no `DATABASE_URL` is configured.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionKey, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load_profile(&self, key: &SessionKey) -> Result<Profile> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(key)
            .map(|s| s.profile.clone())
            .unwrap_or_default())
    }

    async fn save_profile(&self, key: &SessionKey, profile: &Profile) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.entry(key.clone()).or_default().profile = profile.clone();
        Ok(())
    }

    async fn append_message(&self, key: &SessionKey, sender: Sender, message: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(key.clone())
            .or_default()
            .history
            .push(ChatMessage {
                sender,
                message: message.to_string(),
                created_at: Utc::now(),
            });
        Ok(())
    }

    async fn history(&self, key: &SessionKey) -> Result<Vec<ChatMessage>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(key)
            .map(|s| s.history.clone())
            .unwrap_or_default())
    }

    async fn insert_jd(&self, key: &SessionKey, jd: &JobDescriptionArtifact) -> Result<StoredJd> {
        let stored = StoredJd {
            id: Uuid::new_v4(),
            employee_id: key.employee_id.clone(),
            jd_session_id: key.jd_session_id.clone(),
            status: JdStatus::Generated,
            jd_json: jd.clone(),
            created_at: Utc::now(),
            approved_at: None,
        };
        let mut sessions = self.sessions.write().await;
        sessions.entry(key.clone()).or_default().jds.push(stored.clone());
        Ok(stored)
    }

    async fn latest_jd(&self, key: &SessionKey) -> Result<Option<StoredJd>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(key).and_then(|s| s.jds.last().cloned()))
    }

    async fn approve_jd(
        &self,
        key: &SessionKey,
        jd_id: Uuid,
        approved_at: DateTime<Utc>,
    ) -> Result<Option<StoredJd>> {
        let mut sessions = self.sessions.write().await;
        let Some(record) = sessions.get_mut(key) else {
            return Ok(None);
        };
        let approved = record
            .jds
            .iter_mut()
            .find(|jd| jd.id == jd_id && jd.status == JdStatus::Generated)
            .map(|jd| {
                jd.status = JdStatus::Approved;
                jd.approved_at = Some(approved_at);
                jd.clone()
            });
        Ok(approved)
    }
}

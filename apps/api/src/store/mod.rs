//! Session persistence.
//!
//! Every intake session is keyed by `(employee_id, jd_session_id)`. The store owns
//! its own concurrency control; callers hold it as `Arc<dyn SessionStore>`.

pub mod memory;
pub mod postgres;

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::intake::profile::Profile;
use crate::jd::schema::JobDescriptionArtifact;
use crate::models::intake::{ChatMessage, Sender, StoredJd};

pub use memory::MemorySessionStore;
pub use postgres::PgSessionStore;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
pub struct SessionKey {
    pub employee_id: String,
    pub jd_session_id: String,
}

impl SessionKey {
    pub fn new(employee_id: impl Into<String>, jd_session_id: impl Into<String>) -> Self {
        Self {
            employee_id: employee_id.into(),
            jd_session_id: jd_session_id.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.employee_id, self.jd_session_id)
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Answers collected so far; empty for an unknown session.
    async fn load_profile(&self, key: &SessionKey) -> Result<Profile>;

    async fn save_profile(&self, key: &SessionKey, profile: &Profile) -> Result<()>;

    async fn append_message(&self, key: &SessionKey, sender: Sender, message: &str) -> Result<()>;

    /// Chat messages, oldest first.
    async fn history(&self, key: &SessionKey) -> Result<Vec<ChatMessage>>;

    /// Persists a freshly generated JD with status `generated`.
    async fn insert_jd(&self, key: &SessionKey, jd: &JobDescriptionArtifact) -> Result<StoredJd>;

    async fn latest_jd(&self, key: &SessionKey) -> Result<Option<StoredJd>>;

    /// Flips a `generated` JD to `approved`. Returns `None` when the JD does not
    /// exist or is no longer `generated`, so concurrent approvals cannot both win.
    async fn approve_jd(
        &self,
        key: &SessionKey,
        jd_id: Uuid,
        approved_at: DateTime<Utc>,
    ) -> Result<Option<StoredJd>>;
}

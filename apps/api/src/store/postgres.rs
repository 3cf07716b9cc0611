use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use super::{SessionKey, SessionStore};
use crate::intake::profile::Profile;
use crate::jd::schema::JobDescriptionArtifact;
use crate::models::intake::{
    ChatHistoryRow, ChatMessage, JdStatus, JobDescriptionRow, Sender, StoredJd,
};

const JD_COLUMNS: &str =
    "id, employee_id, jd_session_id, jd_json, status, created_at, approved_at";

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool. Tables come from `migrations/`, applied out of band.
    pub async fn connect(database_url: &str) -> Result<Self> {
        info!("Connecting to PostgreSQL...");

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("PostgreSQL connection pool established");
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn load_profile(&self, key: &SessionKey) -> Result<Profile> {
        let answers: Option<Json<Profile>> = sqlx::query_scalar(
            "SELECT answers FROM employee_profiles WHERE employee_id = $1 AND jd_session_id = $2",
        )
        .bind(&key.employee_id)
        .bind(&key.jd_session_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to load profile for {key}"))?;

        Ok(answers.map(|Json(p)| p).unwrap_or_default())
    }

    async fn save_profile(&self, key: &SessionKey, profile: &Profile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO employee_profiles (employee_id, jd_session_id, answers, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (employee_id, jd_session_id)
            DO UPDATE SET answers = EXCLUDED.answers, updated_at = NOW()
            "#,
        )
        .bind(&key.employee_id)
        .bind(&key.jd_session_id)
        .bind(Json(profile))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save profile for {key}"))?;

        debug!("Saved {} answers for {key}", profile.len());
        Ok(())
    }

    async fn append_message(&self, key: &SessionKey, sender: Sender, message: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO chat_history (employee_id, jd_session_id, sender, message) VALUES ($1, $2, $3, $4)",
        )
        .bind(&key.employee_id)
        .bind(&key.jd_session_id)
        .bind(sender.as_str())
        .bind(message)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to record chat message for {key}"))?;
        Ok(())
    }

    async fn history(&self, key: &SessionKey) -> Result<Vec<ChatMessage>> {
        let rows: Vec<ChatHistoryRow> = sqlx::query_as(
            r#"
            SELECT id, sender, message, created_at FROM chat_history
            WHERE employee_id = $1 AND jd_session_id = $2
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(&key.employee_id)
        .bind(&key.jd_session_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to load chat history for {key}"))?;

        rows.into_iter().map(ChatMessage::try_from).collect()
    }

    async fn insert_jd(&self, key: &SessionKey, jd: &JobDescriptionArtifact) -> Result<StoredJd> {
        let row: JobDescriptionRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO job_descriptions (employee_id, jd_session_id, jd_json, status)
            VALUES ($1, $2, $3, $4)
            RETURNING {JD_COLUMNS}
            "#
        ))
        .bind(&key.employee_id)
        .bind(&key.jd_session_id)
        .bind(Json(jd))
        .bind(JdStatus::Generated.as_str())
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to store job description for {key}"))?;

        row.try_into()
    }

    async fn latest_jd(&self, key: &SessionKey) -> Result<Option<StoredJd>> {
        let row: Option<JobDescriptionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {JD_COLUMNS} FROM job_descriptions
            WHERE employee_id = $1 AND jd_session_id = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(&key.employee_id)
        .bind(&key.jd_session_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to load job description for {key}"))?;

        row.map(StoredJd::try_from).transpose()
    }

    async fn approve_jd(
        &self,
        key: &SessionKey,
        jd_id: Uuid,
        approved_at: DateTime<Utc>,
    ) -> Result<Option<StoredJd>> {
        // Conditional on the current status so a second approval updates nothing.
        let row: Option<JobDescriptionRow> = sqlx::query_as(&format!(
            r#"
            UPDATE job_descriptions
            SET status = $1, approved_at = $2
            WHERE id = $3 AND employee_id = $4 AND jd_session_id = $5 AND status = $6
            RETURNING {JD_COLUMNS}
            "#
        ))
        .bind(JdStatus::Approved.as_str())
        .bind(approved_at)
        .bind(jd_id)
        .bind(&key.employee_id)
        .bind(&key.jd_session_id)
        .bind(JdStatus::Generated.as_str())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to approve job description {jd_id}"))?;

        row.map(StoredJd::try_from).transpose()
    }
}

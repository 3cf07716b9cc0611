use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::jd::schema::JobDescriptionArtifact;

/// Lifecycle of a stored job description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JdStatus {
    Generated,
    Approved,
}

impl JdStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JdStatus::Generated => "generated",
            JdStatus::Approved => "approved",
        }
    }
}

impl fmt::Display for JdStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JdStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generated" => Ok(JdStatus::Generated),
            "approved" => Ok(JdStatus::Approved),
            other => Err(anyhow!("unknown job description status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Agent,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Agent => "agent",
        }
    }
}

/// A job description as persisted, with its lifecycle status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredJd {
    pub id: Uuid,
    pub employee_id: String,
    pub jd_session_id: String,
    pub status: JdStatus,
    pub jd_json: JobDescriptionArtifact,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub sender: Sender,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

// ────────────────────────────────────────────────────────────────────────────
// Database rows
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, FromRow)]
pub struct JobDescriptionRow {
    pub id: Uuid,
    pub employee_id: String,
    pub jd_session_id: String,
    pub jd_json: Value,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobDescriptionRow> for StoredJd {
    type Error = anyhow::Error;

    fn try_from(row: JobDescriptionRow) -> Result<Self, Self::Error> {
        Ok(StoredJd {
            status: row.status.parse()?,
            jd_json: serde_json::from_value(row.jd_json)
                .with_context(|| format!("Stored job description {} is malformed", row.id))?,
            id: row.id,
            employee_id: row.employee_id,
            jd_session_id: row.jd_session_id,
            created_at: row.created_at,
            approved_at: row.approved_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ChatHistoryRow {
    pub id: i64,
    pub sender: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ChatHistoryRow> for ChatMessage {
    type Error = anyhow::Error;

    fn try_from(row: ChatHistoryRow) -> Result<Self, Self::Error> {
        let sender = match row.sender.as_str() {
            "user" => Sender::User,
            "agent" => Sender::Agent,
            other => return Err(anyhow!("unknown chat sender '{other}' in row {}", row.id)),
        };
        Ok(ChatMessage {
            sender,
            message: row.message,
            created_at: row.created_at,
        })
    }
}

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::jd::orchestrator::{DEFAULT_BACKOFF_BASE, DEFAULT_MAX_ATTEMPTS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Anthropic,
    Gemini,
}

impl FromStr for LlmProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Ok(LlmProvider::Anthropic),
            "gemini" | "google" => Ok(LlmProvider::Gemini),
            other => bail!("LLM_PROVIDER must be 'anthropic' or 'gemini', got '{other}'"),
        }
    }
}

/// S3 / MinIO settings for archiving approved job descriptions.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Application configuration loaded from environment variables.
/// Startup fails if a variable required by the chosen setup is missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub llm_provider: LlmProvider,
    pub llm_api_key: String,
    /// Model override; `None` uses the backend's default.
    pub llm_model: Option<String>,
    /// `None` runs on the in-memory session store.
    pub database_url: Option<String>,
    pub s3: Option<S3Config>,
    pub port: u16,
    pub rust_log: String,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub generation_timeout: Duration,
    pub use_tools: bool,
    pub questions_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds the config from any variable lookup. Empty values count as unset.
    pub fn from_vars<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| {
            get(key).with_context(|| format!("Required environment variable '{key}' is not set"))
        };

        let llm_provider = match get("LLM_PROVIDER") {
            Some(raw) => raw.parse()?,
            None => LlmProvider::Gemini,
        };
        let (key_var, model_var) = match llm_provider {
            LlmProvider::Anthropic => ("ANTHROPIC_API_KEY", "ANTHROPIC_MODEL"),
            LlmProvider::Gemini => ("GEMINI_API_KEY", "GEMINI_MODEL"),
        };

        let s3 = match get("S3_BUCKET") {
            Some(bucket) => Some(S3Config {
                bucket,
                endpoint: require("S3_ENDPOINT")?,
                access_key_id: require("AWS_ACCESS_KEY_ID")?,
                secret_access_key: require("AWS_SECRET_ACCESS_KEY")?,
            }),
            None => None,
        };

        Ok(Config {
            llm_provider,
            llm_api_key: require(key_var)?,
            llm_model: get(model_var),
            database_url: get("DATABASE_URL"),
            s3,
            port: parse_or(get("PORT"), "PORT", 8080)?,
            rust_log: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            max_attempts: parse_or(get("JD_MAX_ATTEMPTS"), "JD_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
            backoff_base: Duration::from_millis(parse_or(
                get("JD_BACKOFF_BASE_MS"),
                "JD_BACKOFF_BASE_MS",
                DEFAULT_BACKOFF_BASE.as_millis() as u64,
            )?),
            generation_timeout: Duration::from_secs(parse_or(
                get("JD_GENERATION_TIMEOUT_SECS"),
                "JD_GENERATION_TIMEOUT_SECS",
                120,
            )?),
            use_tools: parse_flag(get("JD_USE_TOOLS"), "JD_USE_TOOLS")?,
            questions_path: get("INTAKE_QUESTIONS_PATH").map(PathBuf::from),
        })
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        None => Ok(default),
    }
}

fn parse_flag(raw: Option<String>, key: &str) -> Result<bool> {
    match raw.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => bail!("{key} must be a boolean, got '{v}'"),
        },
    }
}

mod archive;
mod config;
mod errors;
mod intake;
mod jd;
mod llm_client;
mod models;
mod routes;
mod state;
mod store;

#[cfg(test)]
mod testing;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::archive::JdArchive;
use crate::config::{Config, LlmProvider, S3Config};
use crate::intake::questions::QuestionSet;
use crate::intake::service::IntakeService;
use crate::jd::orchestrator::{JdOrchestrator, OutputMode, RetryPolicy};
use crate::llm_client::{AnthropicClient, GeminiClient, TextGenerator};
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::{MemorySessionStore, PgSessionStore, SessionStore};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting JD agent v{}", env!("CARGO_PKG_VERSION"));

    let generator = build_generator(&config)?;
    info!("LLM backend initialized ({})", generator.backend());

    let store: Arc<dyn SessionStore> = match &config.database_url {
        Some(url) => Arc::new(PgSessionStore::connect(url).await?),
        None => {
            info!("DATABASE_URL not set; using in-memory session store");
            Arc::new(MemorySessionStore::new())
        }
    };

    let questions = match &config.questions_path {
        Some(path) => QuestionSet::from_json_file(path)?,
        None => QuestionSet::default(),
    };
    info!("Loaded {} intake questions", questions.len());

    let archive = match &config.s3 {
        Some(s3) => {
            let client = build_s3_client(s3).await;
            info!("S3 archive enabled (bucket: {})", s3.bucket);
            Some(JdArchive::new(client, s3.bucket.clone()))
        }
        None => None,
    };

    let mode = if config.use_tools {
        OutputMode::ToolCall
    } else {
        OutputMode::Text
    };
    let policy = RetryPolicy::new(config.max_attempts, config.backoff_base);
    info!(
        "JD generation: {} attempts, {}ms backoff base, {:?} mode",
        policy.max_attempts,
        policy.backoff_base.as_millis(),
        mode
    );

    let intake = IntakeService::new(
        store,
        JdOrchestrator::new(generator, policy, mode),
        Arc::new(questions),
        config.generation_timeout,
        archive,
    );

    let state = AppState {
        intake: Arc::new(intake),
    };

    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()), // TODO: restrict CORS origins once the web client's host is fixed
    );

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_generator(config: &Config) -> Result<Arc<dyn TextGenerator>> {
    let api_key = config.llm_api_key.clone();
    let generator: Arc<dyn TextGenerator> = match config.llm_provider {
        LlmProvider::Anthropic => {
            let model = config
                .llm_model
                .clone()
                .unwrap_or_else(|| llm_client::anthropic::DEFAULT_MODEL.to_string());
            Arc::new(AnthropicClient::new(api_key, model)?)
        }
        LlmProvider::Gemini => {
            let model = config
                .llm_model
                .clone()
                .unwrap_or_else(|| llm_client::gemini::DEFAULT_MODEL.to_string());
            Arc::new(GeminiClient::new(api_key, model)?)
        }
    };
    Ok(generator)
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(s3: &S3Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &s3.access_key_id,
        &s3.secret_access_key,
        None,
        None,
        "jd-agent-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&s3.endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::intake::machine::IntakeError;
use crate::jd::orchestrator::GenerationError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Answer format error: {0}")]
    AnswerFormat(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Generator unavailable: {0}")]
    GeneratorUnavailable(String),

    #[error("Generator error: {0}")]
    GeneratorFatal(String),

    #[error("Generation timed out: {0}")]
    Timeout(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<IntakeError> for AppError {
    fn from(e: IntakeError) -> Self {
        match e {
            IntakeError::AnswerFormat { .. } => AppError::AnswerFormat(e.to_string()),
            IntakeError::InvalidTransition { .. } => AppError::InvalidTransition(e.to_string()),
            IntakeError::Generation(g) => match g {
                GenerationError::Exhausted { .. } => AppError::GenerationFailed(g.to_string()),
                GenerationError::Unavailable { .. } => {
                    AppError::GeneratorUnavailable(g.to_string())
                }
                GenerationError::Fatal { .. } => AppError::GeneratorFatal(g.to_string()),
                GenerationError::TimedOut(_) => AppError::Timeout(g.to_string()),
            },
            IntakeError::Internal(e) => AppError::Internal(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::AnswerFormat(msg) => {
                (StatusCode::BAD_REQUEST, "ANSWER_FORMAT_ERROR", msg.clone())
            }
            AppError::InvalidTransition(msg) => {
                (StatusCode::CONFLICT, "INVALID_TRANSITION", msg.clone())
            }
            AppError::GenerationFailed(msg) => {
                tracing::warn!("JD generation exhausted: {msg}");
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "GENERATION_FAILED",
                    msg.clone(),
                )
            }
            AppError::GeneratorUnavailable(msg) => {
                tracing::error!("Generator unavailable: {msg}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "GENERATOR_UNAVAILABLE",
                    "The language model backend is unavailable".to_string(),
                )
            }
            AppError::GeneratorFatal(msg) => {
                tracing::error!("Generator error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "GENERATOR_ERROR",
                    "The language model backend rejected the request".to_string(),
                )
            }
            AppError::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, "GENERATION_TIMEOUT", msg.clone()),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::intake::machine::IntakeState;
    use crate::jd::extraction::ExtractionError;
    use crate::jd::validation::ValidationError;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_answer_format_maps_to_400() {
        let err: AppError = IntakeError::AnswerFormat {
            field: "experience".to_string(),
            message: "expected a whole number".to_string(),
        }
        .into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "ANSWER_FORMAT_ERROR");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("experience"));
    }

    #[test]
    fn test_intake_errors_map_to_statuses() {
        let cases: Vec<(IntakeError, StatusCode)> = vec![
            (
                IntakeError::InvalidTransition {
                    state: IntakeState::Collecting,
                    action: "approve",
                },
                StatusCode::CONFLICT,
            ),
            (
                GenerationError::Exhausted {
                    attempts: 3,
                    last_error: ValidationError::Extraction(ExtractionError(
                        "no structured object found".to_string(),
                    )),
                }
                .into(),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                GenerationError::Unavailable {
                    attempts: 3,
                    message: "503".to_string(),
                }
                .into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                GenerationError::Fatal {
                    attempt: 1,
                    message: "401".to_string(),
                }
                .into(),
                StatusCode::BAD_GATEWAY,
            ),
            (
                GenerationError::TimedOut(Duration::from_secs(120)).into(),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                anyhow::anyhow!("connection reset").into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}

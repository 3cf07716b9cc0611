use axum::{
    extract::{Path, State},
    Json,
};

use crate::errors::AppError;
use crate::intake::questions::QuestionSet;
use crate::intake::service::{Approval, ChatReply, ChatRequest};
use crate::models::intake::{ChatMessage, StoredJd};
use crate::state::AppState;
use crate::store::SessionKey;

/// GET /agent/questions
pub async fn handle_questions(State(state): State<AppState>) -> Json<QuestionSet> {
    Json(state.intake.questions().clone())
}

/// POST /agent/chat/:employee_id/:jd_session_id
pub async fn handle_chat(
    State(state): State<AppState>,
    Path(key): Path<SessionKey>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatReply>, AppError> {
    let reply = state.intake.chat(&key, req).await?;
    Ok(Json(reply))
}

/// POST /agent/generate/:employee_id/:jd_session_id
pub async fn handle_generate(
    State(state): State<AppState>,
    Path(key): Path<SessionKey>,
) -> Result<Json<ChatReply>, AppError> {
    let generated = state.intake.generate(&key).await?;
    Ok(Json(generated.to_reply()?))
}

/// POST /agent/approve/:employee_id/:jd_session_id
pub async fn handle_approve(
    State(state): State<AppState>,
    Path(key): Path<SessionKey>,
) -> Result<Json<Approval>, AppError> {
    let approval = state.intake.approve(&key).await?;
    Ok(Json(approval))
}

/// GET /agent/jd/:employee_id/:jd_session_id
pub async fn handle_latest_jd(
    State(state): State<AppState>,
    Path(key): Path<SessionKey>,
) -> Result<Json<StoredJd>, AppError> {
    state
        .intake
        .latest(&key)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No job description for session {key}")))
}

/// GET /agent/history/:employee_id/:jd_session_id
pub async fn handle_history(
    State(state): State<AppState>,
    Path(key): Path<SessionKey>,
) -> Result<Json<Vec<ChatMessage>>, AppError> {
    let history = state.intake.history(&key).await?;
    Ok(Json(history))
}

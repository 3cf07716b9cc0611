pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::intake::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/agent/questions", get(handlers::handle_questions))
        .route(
            "/agent/chat/:employee_id/:jd_session_id",
            post(handlers::handle_chat),
        )
        .route(
            "/agent/generate/:employee_id/:jd_session_id",
            post(handlers::handle_generate),
        )
        .route(
            "/agent/approve/:employee_id/:jd_session_id",
            post(handlers::handle_approve),
        )
        .route(
            "/agent/jd/:employee_id/:jd_session_id",
            get(handlers::handle_latest_jd),
        )
        .route(
            "/agent/history/:employee_id/:jd_session_id",
            get(handlers::handle_history),
        )
        .with_state(state)
}

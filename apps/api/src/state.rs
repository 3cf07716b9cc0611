use std::sync::Arc;

use crate::intake::service::IntakeService;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub intake: Arc<IntakeService>,
}

// Route table for the CodePulse API
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use crate::handlers;
use crate::AppState;

/// Leaves room for test cases on top of a maximal source file; the code limit itself is checked in the handler
const BODY_LIMIT_BYTES: usize = 8 * 1024 * 1024;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/execute", post(handlers::execute))
        .route("/submissions/:id", get(handlers::get_submission))
        .route("/languages", get(handlers::list_languages))
        .route("/status", get(handlers::health_check))
        .route("/metrics", get(handlers::scrape_metrics))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
}

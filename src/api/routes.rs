//! API routes configuration module

use crate::api::handlers::{get_task, health, list_tasks, llm_test, routed_query, task_query};
use crate::app::App;
use axum::{
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;

/// Creates and configures the API router with all routes
///
/// # Arguments
/// * `app` - Service state to be shared across handlers
///
/// # Returns
/// * `Router` - Configured router with all API endpoints under `/api/v1`
pub fn app(app: Arc<App>) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/tasks", get(list_tasks))
        .route("/tasks/:id", get(get_task))
        .route("/task/query", post(task_query))
        .route("/query", post(routed_query))
        .route("/llm_test", get(llm_test));
    Router::new().nest("/api/v1", api).layer(Extension(app))
}

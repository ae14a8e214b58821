use crate::api::errors::ApiError;
use crate::app::App;
use crate::config::{Environment, GenerationMode};
use crate::constants::LLM_PROBE_PROMPT;
use crate::core::{
    QueryResponse, QueryStatus, RegisteredTaskSummary, RoutedQueryRequest,
    RoutedQueryResponse, TaskQueryRequest,
};
use crate::llm::{ChatMessage, LlmProvider};
use axum::http::StatusCode;
use axum::{
    extract::{Extension, Path},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

/// Service status returned by the health endpoint
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub environment: Environment,
    pub llm_mode: GenerationMode,
    pub uptime_seconds: u64,
}

/// Result of the backend connectivity probe
#[derive(Serialize)]
pub struct LlmTestResponse {
    pub ok: bool,
    pub answer: Option<String>,
    pub error: Option<String>,
}

/// HTTP status of a task query outcome
pub fn status_code(status: QueryStatus) -> StatusCode {
    match status {
        QueryStatus::NotFound => StatusCode::NOT_FOUND,
        QueryStatus::KindMismatch => StatusCode::BAD_REQUEST,
        QueryStatus::Forbidden => StatusCode::FORBIDDEN,
        QueryStatus::Answered | QueryStatus::BackendFailure | QueryStatus::RoutingFailure => {
            StatusCode::OK
        }
    }
}

/// Reports liveness and the effective environment
pub async fn health(Extension(app): Extension<Arc<App>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        environment: app.environment.current_environment(),
        llm_mode: app.config.llm.mode,
        uptime_seconds: app.uptime_seconds(),
    })
}

/// Lists every valid task
pub async fn list_tasks(Extension(app): Extension<Arc<App>>) -> Json<Vec<RegisteredTaskSummary>> {
    Json(app.registry.clone().list_all_async().await)
}

/// Returns the summary of one task
///
/// # Arguments
/// * `id` - Task ID to look up
///
/// # Returns
/// * `Result<Json<RegisteredTaskSummary>, ApiError>` - Task summary, 404 when unknown or invalid
pub async fn get_task(
    Path(id): Path<String>,
    Extension(app): Extension<Arc<App>>,
) -> Result<Json<RegisteredTaskSummary>, ApiError> {
    let task = app.registry.get(&id)?;
    Ok(Json(task.as_ref().into()))
}

/// Runs the pipeline for an explicit task
pub async fn task_query(
    Extension(app): Extension<Arc<App>>,
    Json(payload): Json<TaskQueryRequest>,
) -> (StatusCode, Json<QueryResponse>) {
    let response = app.orchestrator.run(&payload).await;
    (status_code(response.status), Json(response))
}

/// Classifies the query and runs the pipeline for the chosen task
pub async fn routed_query(
    Extension(app): Extension<Arc<App>>,
    Json(payload): Json<RoutedQueryRequest>,
) -> Json<RoutedQueryResponse> {
    Json(app.orchestrator.run_routed(&payload).await)
}

/// Sends a one-word probe to the generation backend
pub async fn llm_test(Extension(app): Extension<Arc<App>>) -> Json<LlmTestResponse> {
    let messages = vec![ChatMessage::user(LLM_PROBE_PROMPT)];
    match app.llm.call_llm_api(messages, None).await {
        Ok(answer) => Json(LlmTestResponse {
            ok: true,
            answer: Some(answer),
            error: None,
        }),
        Err(e) => Json(LlmTestResponse {
            ok: false,
            answer: None,
            error: Some(e.to_string()),
        }),
    }
}

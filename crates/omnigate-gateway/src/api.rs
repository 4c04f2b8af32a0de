//! Handlers for the workflow, task and autonomy routes.

use crate::error::ApiError;
use crate::server::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use omnigate_core::OmnigateError;
use omnigate_orchestrator::{
    Task, TaskStatus, Workflow, WorkflowRequest, WorkflowSnapshot, WorkflowStatus,
};
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Default, Deserialize)]
pub struct SubmitQuery {
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

fn parse_status<S: FromStr<Err = String>>(raw: Option<&str>) -> Result<Option<S>, ApiError> {
    raw.map(|s| S::from_str(s).map_err(|e| ApiError(OmnigateError::Validation(e))))
        .transpose()
}

/// `POST /workflows`: create a workflow and run it, in the background by
/// default or inline with `?wait=true`.
pub async fn submit_workflow(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SubmitQuery>,
    Json(request): Json<WorkflowRequest>,
) -> Result<Response, ApiError> {
    let workflow = state.coordinator.create_workflow(request).await?;

    if query.wait {
        let result = state.coordinator.execute_workflow(&workflow.id).await?;
        let body = json!({
            "id": workflow.id,
            "status": WorkflowStatus::Completed,
            "result": result,
        });
        return Ok((StatusCode::OK, Json(body)).into_response());
    }

    state.coordinator.spawn_execution(workflow.id.clone());
    let body = json!({ "id": workflow.id, "status": workflow.status });
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

/// `GET /workflows`
pub async fn list_workflows(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Vec<Workflow>>, ApiError> {
    let status = parse_status::<WorkflowStatus>(query.status.as_deref())?;
    Ok(Json(state.coordinator.list_workflows(status)))
}

/// `GET /workflows/{id}`: the workflow together with its tasks.
pub async fn get_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowSnapshot>, ApiError> {
    let workflow = state.coordinator.get_workflow(&id)?;
    let tasks = state.coordinator.workflow_tasks(&id)?;
    Ok(Json(WorkflowSnapshot { workflow, tasks }))
}

/// `POST /workflows/{id}/cancel`
pub async fn cancel_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Workflow>, ApiError> {
    Ok(Json(state.coordinator.cancel_workflow(&id).await?))
}

/// `GET /tasks`
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let status = parse_status::<TaskStatus>(query.status.as_deref())?;
    Ok(Json(state.coordinator.list_tasks(status)))
}

/// `GET /tasks/{*id}`: task ids are `{workflow}/{name}`.
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(state.coordinator.get_task(&id)?))
}

/// `POST /autonomy/start`
pub async fn start_autonomy(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let started = state.autonomy.start();
    info!(started, "Autonomy start requested");
    Json(json!({ "running": state.autonomy.is_running(), "changed": started }))
}

/// `POST /autonomy/stop`
pub async fn stop_autonomy(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stopped = state.autonomy.stop().await;
    info!(stopped, "Autonomy stop requested");
    Json(json!({ "running": state.autonomy.is_running(), "changed": stopped }))
}

//! Field agent endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use super::auth::require_agent;
use super::path_id;
use super::routes::AppState;
use super::types::{Page, RejectRequest, SubmitRequest, TaskQuery};
use crate::accounts::Actor;
use crate::task::{Task, TaskId, TaskStatus};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks", get(list_tasks))
        .route("/dashboard", get(dashboard))
        .route("/tasks/:id/start", post(start_task))
        .route("/tasks/:id/submit", post(submit_task))
        .route("/tasks/:id/reject", post(reject_task))
}

/// GET /api/agent/tasks?status=
async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<TaskQuery>,
) -> Result<Json<Page<Task>>, (StatusCode, String)> {
    require_agent(&actor)?;
    let filter = query.filter(true)?;
    let tasks = state.workflow.list_tasks(&actor, filter).await?;
    Ok(Json(query.paginate(tasks)))
}

/// GET /api/agent/dashboard - Task counts per status.
async fn dashboard(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<BTreeMap<TaskStatus, usize>>, (StatusCode, String)> {
    let agent_id = require_agent(&actor)?;
    Ok(Json(state.workflow.agent_dashboard(agent_id).await?))
}

async fn start_task(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<Task>, (StatusCode, String)> {
    let agent_id = require_agent(&actor)?;
    let id: TaskId = path_id(&id, "task")?;
    Ok(Json(state.workflow.start_task(agent_id, id).await?))
}

/// POST /api/agent/tasks/:id/submit - File the visit report.
async fn submit_task(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<Task>, (StatusCode, String)> {
    let agent_id = require_agent(&actor)?;
    let id: TaskId = path_id(&id, "task")?;
    let (form, media) = req.into_parts()?;
    Ok(Json(state.workflow.submit(agent_id, id, form, media).await?))
}

async fn reject_task(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(req): Json<RejectRequest>,
) -> Result<Json<Task>, (StatusCode, String)> {
    let agent_id = require_agent(&actor)?;
    let id: TaskId = path_id(&id, "task")?;
    Ok(Json(
        state
            .workflow
            .reject_as_agent(agent_id, id, &req.comments)
            .await?,
    ))
}

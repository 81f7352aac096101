//! Client endpoints: request intake and task tracking.

use std::sync::Arc;

use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;

use super::auth::require_client;
use super::routes::AppState;
use super::types::{CreateTasksRequest, Page, TaskQuery};
use crate::accounts::Actor;
use crate::task::Task;
use crate::workflow::{ClientDashboard, IntakeReport};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_tasks))
        .route("/dashboard", get(dashboard))
}

/// POST /api/client/tasks - Bulk intake. Duplicates are reported, not created.
async fn create_tasks(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CreateTasksRequest>,
) -> Result<(StatusCode, Json<IntakeReport>), (StatusCode, String)> {
    let client_id = require_client(&actor)?;
    let report = state
        .workflow
        .create_tasks(client_id, req.tasks, Utc::now())
        .await?;
    let status = if report.created.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(report)))
}

/// GET /api/client/tasks
async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<TaskQuery>,
) -> Result<Json<Page<Task>>, (StatusCode, String)> {
    require_client(&actor)?;
    let filter = query.filter(false)?;
    let tasks = state.workflow.list_tasks(&actor, filter).await?;
    Ok(Json(query.paginate(tasks)))
}

/// GET /api/client/dashboard - Month-to-date task and report counts.
async fn dashboard(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<ClientDashboard>, (StatusCode, String)> {
    let client_id = require_client(&actor)?;
    Ok(Json(state.workflow.client_dashboard(client_id, Utc::now()).await?))
}

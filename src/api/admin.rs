//! Administrator endpoints: task oversight, assignment, approval and accounts.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{Datelike, Utc};
use std::sync::Arc;

use super::auth::{self, TOKEN_TTL_DAYS};
use super::routes::AppState;
use super::path_id;
use super::types::*;
use crate::accounts::{Actor, Agent, AgentId, Client, ClientId};
use crate::notify::{Notification, Recipient};
use crate::store::AccountStore;
use crate::task::{Task, TaskId};
use crate::workflow::{
    AdminDashboard, ApprovalReport, AssignmentReport, MonthSummary, RejectionOutcome,
    SheetAssignment,
};

/// Create admin routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/tasks", get(list_tasks))
        .route("/tasks/:id", delete(delete_task))
        .route("/tasks/:id/reject", post(reject_task))
        .route("/tasks/:id/auto-reject", post(auto_reject_task))
        .route("/reports/approve", post(approve_reports))
        .route("/agents", post(create_agent))
        .route("/agents/:id/assign", post(assign_tasks))
        .route("/agents/:id/assign-sheet", post(assign_sheet))
        .route("/clients", post(create_client))
        .route("/clients/:id/integration", put(set_integration))
        .route("/clients/:id/summary", get(client_summary))
        .route("/notifications", post(create_notification))
        .route_layer(middleware::from_fn(auth::admin_only))
}

/// GET /api/admin/tasks - Filtered, paginated task listing.
async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TaskQuery>,
) -> Result<Json<Page<Task>>, (StatusCode, String)> {
    let filter = query.filter(false)?;
    let tasks = state.workflow.list_tasks(&Actor::Admin, filter).await?;
    Ok(Json(query.paginate(tasks)))
}

/// GET /api/admin/dashboard - Month-to-date counts.
async fn dashboard(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AdminDashboard>, (StatusCode, String)> {
    Ok(Json(state.workflow.admin_dashboard(Utc::now()).await?))
}

/// DELETE /api/admin/tasks/:id
async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Task>, (StatusCode, String)> {
    let id: TaskId = path_id(&id, "task")?;
    Ok(Json(state.workflow.delete_task(id).await?))
}

/// POST /api/admin/tasks/:id/reject - Reject, approve and push the result.
async fn reject_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<RejectRequest>,
) -> Result<Json<RejectionOutcome>, (StatusCode, String)> {
    let id: TaskId = path_id(&id, "task")?;
    Ok(Json(
        state.workflow.reject_as_admin(id, &req.comments, true).await?,
    ))
}

/// POST /api/admin/tasks/:id/auto-reject - Reject and approve without pushing.
async fn auto_reject_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<RejectRequest>,
) -> Result<Json<RejectionOutcome>, (StatusCode, String)> {
    let id: TaskId = path_id(&id, "task")?;
    Ok(Json(
        state.workflow.reject_as_admin(id, &req.comments, false).await?,
    ))
}

/// POST /api/admin/reports/approve
async fn approve_reports(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TaskIdsRequest>,
) -> Result<Json<ApprovalReport>, (StatusCode, String)> {
    Ok(Json(state.workflow.approve_reports(&req.task_ids).await?))
}

/// POST /api/admin/agents/:id/assign
async fn assign_tasks(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<TaskIdsRequest>,
) -> Result<Json<AssignmentReport>, (StatusCode, String)> {
    let agent_id: AgentId = path_id(&id, "agent")?;
    Ok(Json(
        state
            .workflow
            .assign(agent_id, &req.task_ids, Utc::now())
            .await?,
    ))
}

/// POST /api/admin/agents/:id/assign-sheet - Assign and email a CSV sheet.
async fn assign_sheet(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<TaskIdsRequest>,
) -> Result<Json<SheetAssignment>, (StatusCode, String)> {
    let agent_id: AgentId = path_id(&id, "agent")?;
    Ok(Json(
        state
            .workflow
            .assign_with_sheet(agent_id, &req.task_ids, Utc::now())
            .await?,
    ))
}

fn with_token<T>(state: &AppState, account: T, actor: Actor) -> AccountResponse<T> {
    let issued = state.config.jwt_secret.as_deref().and_then(|secret| {
        auth::issue_jwt(secret, TOKEN_TTL_DAYS, &actor)
            .map_err(|e| tracing::error!("Issuing token failed: {}", e))
            .ok()
    });
    AccountResponse {
        account,
        token: issued.as_ref().map(|(token, _)| token.clone()),
        token_expires_at: issued.map(|(_, exp)| exp),
    }
}

/// POST /api/admin/agents - Register an agent and return a bearer token.
async fn create_agent(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateAgentRequest>,
) -> Result<Json<AccountResponse<Agent>>, (StatusCode, String)> {
    let agent = state.workflow.store().insert_agent(req.into_agent()?).await?;
    tracing::info!("Created agent: {} ({})", agent.email, agent.id);
    let actor = Actor::Agent(agent.id);
    Ok(Json(with_token(&state, agent, actor)))
}

/// POST /api/admin/clients - Register a client and return a bearer token.
async fn create_client(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateClientRequest>,
) -> Result<Json<AccountResponse<Client>>, (StatusCode, String)> {
    let client = state
        .workflow
        .store()
        .insert_client(req.into_client()?)
        .await?;
    tracing::info!("Created client: {} ({})", client.company_name, client.id);
    let actor = Actor::Client(client.id);
    Ok(Json(with_token(&state, client, actor)))
}

/// PUT /api/admin/clients/:id/integration
async fn set_integration(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<IntegrationRequest>,
) -> Result<Json<Client>, (StatusCode, String)> {
    let client_id: ClientId = path_id(&id, "client")?;
    let integration = req.into_integration()?;
    let client = state
        .workflow
        .store()
        .set_integration(client_id, Some(integration))
        .await?;
    tracing::info!(
        "Updated integration for {} (enabled: {})",
        client.company_name,
        client.enabled_integration().is_some()
    );
    Ok(Json(client))
}

/// GET /api/admin/clients/:id/summary?year=&startMonth=
async fn client_summary(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<Vec<MonthSummary>>, (StatusCode, String)> {
    let client_id: ClientId = path_id(&id, "client")?;
    let now = Utc::now();
    Ok(Json(
        state
            .workflow
            .client_monthly_summary(
                client_id,
                query.year.unwrap_or_else(|| now.year()),
                query.start_month.unwrap_or_else(|| now.month()),
            )
            .await?,
    ))
}

/// POST /api/admin/notifications - Create an in-app notification.
async fn create_notification(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NotificationRequest>,
) -> Result<Json<Notification>, (StatusCode, String)> {
    if req.title.trim().is_empty() || req.body.trim().is_empty() {
        return Err(bad_request("title and body are required"));
    }
    let actor = match req.recipient {
        Recipient::Agent(id) => Actor::Agent(id),
        Recipient::Client(id) => Actor::Client(id),
    };
    if !state.workflow.store().actor_exists(&actor).await? {
        return Err((
            StatusCode::NOT_FOUND,
            format!("{} not found", req.recipient.key()),
        ));
    }
    let notification = state
        .workflow
        .notifier()
        .push_in_app(req.recipient, req.kind, req.title, req.body)
        .await?;
    Ok(Json(notification))
}


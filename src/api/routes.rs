//! HTTP router and server.

use std::sync::Arc;

use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    middleware,
    response::Json,
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::accounts::Actor;
use crate::config::Config;
use crate::notify::{Notification, Recipient};
use crate::store::NotificationStore;
use crate::workflow::Workflow;

use super::auth;
use super::types::{HealthResponse, NotificationQuery};
use super::{admin, agent, client};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub workflow: Arc<Workflow>,
}

/// Build the full router. Stored blobs are served under `/files`.
pub fn router(state: Arc<AppState>) -> Router {
    let public_routes = Router::new().route("/api/health", get(health));

    let protected_routes = Router::new()
        .route("/api/notifications", get(list_notifications))
        .nest("/api/admin", admin::routes())
        .nest("/api/agent", agent::routes())
        .nest("/api/client", client::routes())
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .nest_service("/files", ServeDir::new(&state.config.blob_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and run until SIGINT/SIGTERM.
pub async fn serve(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = state.config.bind_addr();
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

/// Health check endpoint.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        dev_mode: state.config.dev_mode,
    })
}

/// GET /api/notifications - The caller's in-app inbox, newest first.
async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Vec<Notification>>, (StatusCode, String)> {
    let recipient = match actor {
        Actor::Agent(id) => Recipient::Agent(id),
        Actor::Client(id) => Recipient::Client(id),
        Actor::Admin => {
            return Err((
                StatusCode::FORBIDDEN,
                "notifications belong to agents and clients".to_string(),
            ))
        }
    };
    let notifications = state
        .workflow
        .store()
        .list_notifications(&recipient, query.kind)
        .await?;
    Ok(Json(notifications))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::blob::LocalBlobStore;
    use crate::notify::{DisabledMailer, Notifier};
    use crate::report::PdfReportGenerator;
    use crate::store::MemoryStore;
    use crate::workflow::testing::RecordingPublisher;

    const SECRET: &str = "router-test-secret";

    struct Harness {
        app: Router,
        _dir: tempfile::TempDir,
    }

    fn harness(dev_mode: bool) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let blob_dir = dir.path().to_string_lossy().to_string();
        let dev = if dev_mode { "true" } else { "false" };
        let config = Config::from_lookup(|key| match key {
            "JWT_SECRET" => Some(SECRET.to_string()),
            "BLOB_DIR" => Some(blob_dir.clone()),
            "DEV_MODE" => Some(dev.to_string()),
            _ => None,
        })
        .unwrap();

        let store = Arc::new(MemoryStore::new());
        let blobs = Arc::new(LocalBlobStore::new(
            config.blob_dir.clone(),
            &config.public_base_url,
        ));
        let notifier = Arc::new(Notifier::new(Arc::new(DisabledMailer), store.clone()));
        let workflow = Workflow::new(
            store,
            blobs,
            Arc::new(PdfReportGenerator),
            Arc::new(RecordingPublisher::default()),
            notifier,
            config.policy(),
        );
        let state = Arc::new(AppState {
            config,
            workflow: Arc::new(workflow),
        });
        Harness {
            app: router(state),
            _dir: dir,
        }
    }

    fn admin_token() -> String {
        auth::issue_jwt(SECRET, 1, &Actor::Admin).unwrap().0
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()));
        (status, value)
    }

    #[tokio::test]
    async fn test_health_is_public_and_api_is_not() {
        let h = harness(false);
        let (status, body) = call(&h.app, "GET", "/api/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, _) = call(&h.app, "GET", "/api/admin/tasks", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(&h.app, "GET", "/api/admin/tasks", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_dev_mode_acts_as_admin() {
        let h = harness(true);
        let (status, body) = call(&h.app, "GET", "/api/admin/tasks", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 0);
    }

    #[tokio::test]
    async fn test_roles_and_error_codes() {
        let h = harness(false);
        let admin = admin_token();

        let (status, created) = call(
            &h.app,
            "POST",
            "/api/admin/clients",
            Some(&admin),
            Some(json!({ "companyName": "Acme Bank", "email": "ops@acme.test" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let client_token = created["token"].as_str().unwrap().to_string();

        let (status, created) = call(
            &h.app,
            "POST",
            "/api/admin/agents",
            Some(&admin),
            Some(json!({ "fullName": "Kemi Ade", "email": "kemi@fieldcheck.test" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let agent_id = created["account"]["id"].as_str().unwrap().to_string();
        let agent_token = created["token"].as_str().unwrap().to_string();

        let (status, _) = call(
            &h.app,
            "POST",
            "/api/admin/agents",
            Some(&admin),
            Some(json!({ "fullName": "Kemi Again", "email": "KEMI@fieldcheck.test" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        // Clients cannot reach admin routes.
        let (status, _) = call(&h.app, "GET", "/api/admin/tasks", Some(&client_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, intake) = call(
            &h.app,
            "POST",
            "/api/client/tasks",
            Some(&client_token),
            Some(json!({ "tasks": [
                { "activityId": "A-100", "customerName": "Ada Obi", "verificationAddress": "12 Marina Road" }
            ]})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let task_id = intake["created"][0]["id"].as_str().unwrap().to_string();

        let (status, report) = call(
            &h.app,
            "POST",
            &format!("/api/admin/agents/{}/assign", agent_id),
            Some(&admin),
            Some(json!({ "taskIds": [task_id, "nope"] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["assigned"], 1);
        assert_eq!(report["skipped"], 1);

        let (status, page) = call(
            &h.app,
            "GET",
            "/api/agent/tasks?status=assigned",
            Some(&agent_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["total"], 1);

        let (status, _) = call(
            &h.app,
            "POST",
            &format!("/api/agent/tasks/{}/reject", task_id),
            Some(&agent_token),
            Some(json!({ "comments": "" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &h.app,
            "POST",
            "/api/agent/tasks/not-a-task/start",
            Some(&agent_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // Assigned tasks cannot be deleted.
        let (status, _) = call(
            &h.app,
            "DELETE",
            &format!("/api/admin/tasks/{}", task_id),
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_other_agent_gets_forbidden() {
        let h = harness(false);
        let admin = admin_token();
        let (_, created) = call(
            &h.app,
            "POST",
            "/api/admin/clients",
            Some(&admin),
            Some(json!({ "companyName": "Acme Bank", "email": "ops@acme.test" })),
        )
        .await;
        let client_token = created["token"].as_str().unwrap().to_string();
        let (_, first) = call(
            &h.app,
            "POST",
            "/api/admin/agents",
            Some(&admin),
            Some(json!({ "fullName": "Kemi Ade", "email": "kemi@fieldcheck.test" })),
        )
        .await;
        let (_, second) = call(
            &h.app,
            "POST",
            "/api/admin/agents",
            Some(&admin),
            Some(json!({ "fullName": "Tunde Bello", "email": "tunde@fieldcheck.test" })),
        )
        .await;

        let (_, intake) = call(
            &h.app,
            "POST",
            "/api/client/tasks",
            Some(&client_token),
            Some(json!({ "tasks": [
                { "activityId": "A-1", "customerName": "Ada Obi", "verificationAddress": "12 Marina Road" }
            ]})),
        )
        .await;
        let task_id = intake["created"][0]["id"].as_str().unwrap().to_string();
        call(
            &h.app,
            "POST",
            &format!("/api/admin/agents/{}/assign", first["account"]["id"].as_str().unwrap()),
            Some(&admin),
            Some(json!({ "taskIds": [task_id] })),
        )
        .await;

        let (status, _) = call(
            &h.app,
            "POST",
            &format!("/api/agent/tasks/{}/reject", task_id),
            Some(second["token"].as_str().unwrap()),
            Some(json!({ "comments": "Not mine" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_dashboards() {
        let h = harness(false);
        let admin = admin_token();
        let (_, created) = call(
            &h.app,
            "POST",
            "/api/admin/clients",
            Some(&admin),
            Some(json!({ "companyName": "Acme Bank", "email": "ops@acme.test" })),
        )
        .await;
        let client_id = created["account"]["id"].as_str().unwrap().to_string();
        let client_token = created["token"].as_str().unwrap().to_string();
        call(
            &h.app,
            "POST",
            "/api/admin/agents",
            Some(&admin),
            Some(json!({ "fullName": "Kemi Ade", "email": "kemi@fieldcheck.test" })),
        )
        .await;
        call(
            &h.app,
            "POST",
            "/api/client/tasks",
            Some(&client_token),
            Some(json!({ "tasks": [
                { "activityId": "A-1", "customerName": "Ada Obi", "verificationAddress": "12 Marina Road" },
                { "activityId": "A-2", "customerName": "Bola Ade", "verificationAddress": "3 Allen Avenue" }
            ]})),
        )
        .await;

        let (status, stats) = call(&h.app, "GET", "/api/admin/dashboard", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["totalTasks"], 2);
        assert_eq!(stats["byStatus"]["pending"], 2);
        assert_eq!(stats["agentCount"], 1);

        let (status, stats) =
            call(&h.app, "GET", "/api/client/dashboard", Some(&client_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["totalTasks"], 2);
        assert_eq!(stats["reports"]["approved"], 0);

        let (status, _) =
            call(&h.app, "GET", "/api/admin/dashboard", Some(&client_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, summary) = call(
            &h.app,
            "GET",
            &format!("/api/admin/clients/{}/summary?startMonth=12", client_id),
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary.as_array().unwrap().len(), 1);
        assert_eq!(summary[0]["name"], "December");

        let (status, _) = call(
            &h.app,
            "GET",
            &format!("/api/admin/clients/{}/summary?startMonth=0", client_id),
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

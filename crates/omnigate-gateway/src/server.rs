use crate::api;
use crate::middleware::{admin_middleware, auth_middleware, AuthConfig};
use axum::{
    extract::State,
    http::StatusCode,
    middleware as axum_mw,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use omnigate_orchestrator::{AutonomousLoop, WorkflowCoordinator};
use std::sync::Arc;
use tower::ServiceBuilder;

/// Shared application state.
pub struct AppState {
    pub coordinator: Arc<WorkflowCoordinator>,
    pub autonomy: Arc<AutonomousLoop>,
}

/// The main gateway server.
pub struct GatewayServer;

impl GatewayServer {
    /// Build the gateway without auth.
    pub fn build(coordinator: Arc<WorkflowCoordinator>, autonomy: Arc<AutonomousLoop>) -> Router {
        Self::build_with_auth(coordinator, autonomy, AuthConfig::default())
    }

    /// Build the gateway with API-key auth on every route except `/health`
    /// and `/ready`.
    pub fn build_with_auth(
        coordinator: Arc<WorkflowCoordinator>,
        autonomy: Arc<AutonomousLoop>,
        auth: AuthConfig,
    ) -> Router {
        let state = Arc::new(AppState {
            coordinator,
            autonomy,
        });
        let auth = Arc::new(auth);

        let admin = Router::new()
            .route("/autonomy/start", post(api::start_autonomy))
            .route("/autonomy/stop", post(api::stop_autonomy))
            .route_layer(axum_mw::from_fn_with_state(auth.clone(), admin_middleware));

        // outermost layer runs first: authenticate, then check the role
        let protected = Router::new()
            .route(
                "/workflows",
                post(api::submit_workflow).get(api::list_workflows),
            )
            .route("/workflows/{id}", get(api::get_workflow))
            .route("/workflows/{id}/cancel", post(api::cancel_workflow))
            .route("/tasks", get(api::list_tasks))
            .route("/tasks/{*id}", get(api::get_task))
            .merge(admin)
            .route_layer(
                ServiceBuilder::new().layer(axum_mw::from_fn_with_state(auth, auth_middleware)),
            );

        Router::new()
            .route("/health", get(health_handler))
            .route("/ready", get(ready_handler))
            .merge(protected)
            .with_state(state)
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok", "service": "omnigate"}))
}

async fn ready_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ready = state.autonomy.health().is_ready().await;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(serde_json::json!({ "ready": ready })))
}

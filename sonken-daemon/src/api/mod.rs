//! HTTP surface of the daemon: live updates and liveness.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use sonken_core::MonitorManager;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod live;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<MonitorManager>,
    /// Cancelled when the daemon begins shutting down.
    pub shutdown: CancellationToken,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(live::upgrade))
        .route("/api/health", get(health))
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_monitors: usize,
    pub clients: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        active_monitors: state.manager.active_project_ids().await.len(),
        clients: state.manager.broadcaster().client_count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonken_core::{Broadcaster, MonitorConfig, Project, StateManager};

    #[tokio::test]
    async fn test_health_reports_monitors_and_clients() {
        let state = Arc::new(StateManager::new_in_memory().await.unwrap());
        state.insert_project(&Project::new("p1", "p1", "/srv/p1")).await.unwrap();
        let manager = Arc::new(MonitorManager::new(
            state,
            Broadcaster::new(),
            MonitorConfig::default(),
        ));
        let app = AppState { manager: manager.clone(), shutdown: CancellationToken::new() };

        let _client = manager.broadcaster().subscribe();
        manager.start_project_monitoring("p1").await;

        let Json(body) = health(State(app)).await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.active_monitors, 1);
        assert_eq!(body.clients, 1);

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["activeMonitors"], 1);

        manager.stop_all().await;
    }
}

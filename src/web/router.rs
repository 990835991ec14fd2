//! Route definitions for the health server.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::commands::{Descriptor, Dispatcher};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub started_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: i64,
    pub backends: BTreeMap<&'static str, bool>,
}

/// Create the app router.
pub fn create_app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/commands", get(list_commands))
        .with_state(state)
}

/// Process liveness plus per-backend availability.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        backends: state.dispatcher.context().status(),
    })
}

async fn list_commands(State(state): State<AppState>) -> Json<Vec<Descriptor>> {
    Json(
        state
            .dispatcher
            .registry()
            .descriptors()
            .into_iter()
            .cloned()
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::prometheus::tests::FakeMetrics;
    use crate::commands::Registry;
    use crate::context::BackendContext;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn app() -> Router {
        let ctx = BackendContext {
            metrics: Some(Arc::new(FakeMetrics::default())),
            ..Default::default()
        };
        let dispatcher = Dispatcher::new(Arc::new(Registry::builtin().unwrap()), Arc::new(ctx));
        create_app_router(AppState {
            dispatcher: Arc::new(dispatcher),
            started_at: Utc::now(),
        })
    }

    async fn get_json(path: &str) -> serde_json::Value {
        let response = app()
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_backends() {
        let body = get_json("/health").await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["backends"]["prometheus"], true);
        assert_eq!(body["backends"]["jenkins"], false);
    }

    #[tokio::test]
    async fn test_commands_lists_registry() {
        let body = get_json("/commands").await;
        let commands = body.as_array().unwrap();
        assert_eq!(commands.len(), 19);
        assert_eq!(commands[0]["name"], "ai-analyze-build");
        assert!(commands[0].get("rule").is_none());
    }
}

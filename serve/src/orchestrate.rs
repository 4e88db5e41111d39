//! Run and health handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crucible::RunReport;

use crate::app::AppState;

/// Highest accepted `max_retries` value.
const MAX_RETRIES_CAP: u32 = 10;

#[derive(Debug, Deserialize)]
pub(crate) struct OrchestrateRequest {
    task: String,
    #[serde(default)]
    max_retries: Option<u32>,
}

/// `POST /orchestrate`: validates and runs one task to completion.
///
/// The response always carries a full [`RunReport`]; failed runs are
/// `success: false`, not 5xx.
pub(crate) async fn orchestrate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OrchestrateRequest>,
) -> Result<Json<RunReport>, (StatusCode, Json<Value>)> {
    if request.task.trim().is_empty() {
        return Err(bad_request("task must be non-empty"));
    }
    if let Some(max_retries) = request.max_retries {
        if max_retries > MAX_RETRIES_CAP {
            return Err(bad_request("max_retries must be between 0 and 10"));
        }
    }

    info!(task = %request.task, "orchestration requested");
    let report = state.engine.run(request.task, request.max_retries).await;
    Ok(Json(report))
}

/// `GET /health`.
pub(crate) async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "crucible-orchestrator",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn bad_request(message: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "error": message })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::EngineConfig;
    use crucible::{Engine, EngineContext, EventBus, MockLlm, ToolRegistry};

    fn test_state(workspace: &std::path::Path) -> Arc<AppState> {
        let mut config = EngineConfig::default();
        config.workspace_dir = workspace.to_path_buf();
        let engine = Engine::with_context(Arc::new(EngineContext {
            config,
            bus: Arc::new(EventBus::new()),
            llm: Arc::new(MockLlm::new("no plan here")),
            tools: Arc::new(ToolRegistry::new()),
        }));
        Arc::new(AppState {
            engine: Arc::new(engine),
        })
    }

    /// **Scenario**: an empty task is rejected with 422, not run.
    #[tokio::test]
    async fn empty_task_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = orchestrate(
            State(test_state(dir.path())),
            Json(OrchestrateRequest {
                task: "   ".to_string(),
                max_retries: None,
            }),
        )
        .await;
        let (status, body) = result.unwrap_err();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("non-empty"));
    }

    /// **Scenario**: max_retries above the cap is rejected.
    #[tokio::test]
    async fn excessive_retries_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = orchestrate(
            State(test_state(dir.path())),
            Json(OrchestrateRequest {
                task: "do something".to_string(),
                max_retries: Some(11),
            }),
        )
        .await;
        assert!(result.is_err());
    }

    /// **Scenario**: a valid request completes with a report even when the
    /// run itself fails; the HTTP layer never turns that into an error.
    #[tokio::test]
    async fn failed_run_still_returns_report() {
        let dir = tempfile::tempdir().unwrap();
        let result = orchestrate(
            State(test_state(dir.path())),
            Json(OrchestrateRequest {
                task: "print hello".to_string(),
                max_retries: Some(0),
            }),
        )
        .await;
        let Json(report) = result.unwrap();
        assert_eq!(report.task, "print hello");
        assert!(!report.history.is_empty());
    }

    /// **Scenario**: health reports the service identity.
    #[tokio::test]
    async fn health_shape() {
        let Json(body) = health().await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "crucible-orchestrator");
        assert!(body["version"].is_string());
    }
}

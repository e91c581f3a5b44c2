// HTTP route handlers for the CodePulse API

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use pulse_common::config::MAX_SOURCE_CODE_BYTES;
use pulse_common::types::{ExecutionRequest, ExecutionStatus, Language, Mode};
use pulse_sandbox::language::LanguageProfile;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::metrics;
use crate::store::SubmissionStore;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct LanguageInfo {
    pub name: Language,
    pub entry_file: &'static str,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// HTTP status carrying an execution outcome
pub fn status_code(status: ExecutionStatus) -> StatusCode {
    match status {
        ExecutionStatus::Success => StatusCode::OK,
        ExecutionStatus::UnsupportedLanguage => StatusCode::BAD_REQUEST,
        ExecutionStatus::Timeout => StatusCode::REQUEST_TIMEOUT,
        ExecutionStatus::BuildError | ExecutionStatus::RunError | ExecutionStatus::OutputParseError => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
    }
}

/// POST /execute - Run or submit code against its test cases
pub async fn execute(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExecutionRequest>,
) -> Response {
    if request.code.len() > MAX_SOURCE_CODE_BYTES {
        metrics::REJECTED_REQUESTS_TOTAL
            .with_label_values(&["code_too_large"])
            .inc();
        warn!(code_bytes = request.code.len(), "Rejected oversized source");
        return error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("source code exceeds {} bytes", MAX_SOURCE_CODE_BYTES),
        );
    }

    info!(
        language = %request.language,
        mode = %request.mode,
        test_cases = request.test_cases.len(),
        "Execution requested"
    );

    let report = state.sandbox.report(&request).await;
    metrics::record(&report);

    if report.mode == Mode::Submit && report.status == ExecutionStatus::Success {
        match state.store.save(&report).await {
            Ok(()) => info!(submission_id = %report.id, passed = report.passed_count(), "Submission recorded"),
            Err(e) => error!(submission_id = %report.id, error = %e, "Failed to record submission"),
        }
    }

    (status_code(report.status), Json(report)).into_response()
}

/// GET /submissions/{id} - Stored submission report
pub async fn get_submission(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let Ok(submission_id) = Uuid::parse_str(&id) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid submission ID format");
    };

    match state.store.get(submission_id).await {
        Ok(Some(report)) => (StatusCode::OK, Json(report)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Submission not found"),
        Err(e) => {
            error!(submission_id = %id, error = %e, "Failed to fetch submission");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to query submission: {}", e),
            )
        }
    }
}

/// GET /languages - Supported languages
pub async fn list_languages() -> Json<Vec<LanguageInfo>> {
    Json(
        Language::ALL
            .iter()
            .map(|&language| LanguageInfo {
                name: language,
                entry_file: LanguageProfile::of(language).entry_file,
            })
            .collect(),
    )
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus scrape endpoint
pub async fn scrape_metrics() -> Response {
    match metrics::render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemorySubmissionStore;
    use async_trait::async_trait;
    use pulse_common::config::SandboxConfig;
    use pulse_common::types::{ExecutionReport, TestCase};
    use pulse_sandbox::runtime::{BuildRequest, ContainerSpec, CreatedContainer};
    use pulse_sandbox::{ContainerRuntime, RuntimeError, Sandbox};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Runtime whose builds fail unless it was given program output to return
    #[derive(Default)]
    struct StubRuntime {
        logs: Option<Vec<u8>>,
        builds: AtomicUsize,
    }

    #[async_trait]
    impl ContainerRuntime for StubRuntime {
        async fn build_image(&self, _request: BuildRequest) -> Result<(), RuntimeError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            match self.logs {
                Some(_) => Ok(()),
                None => Err(RuntimeError::Daemon("no such base image".to_string())),
            }
        }
        async fn create_container(&self, _spec: &ContainerSpec) -> Result<String, RuntimeError> {
            Ok("stub".to_string())
        }
        async fn start_container(&self, _id: &str) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn wait_container(&self, _id: &str) -> Result<i64, RuntimeError> {
            Ok(0)
        }
        async fn stop_container(&self, _id: &str) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn container_logs(&self, _id: &str) -> Result<Vec<u8>, RuntimeError> {
            Ok(self.logs.clone().unwrap_or_default())
        }
        async fn remove_container(&self, _id: &str) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn list_created_containers(&self, _label: &str) -> Result<Vec<CreatedContainer>, RuntimeError> {
            Ok(Vec::new())
        }
        async fn remove_image(&self, _name: &str, _force: bool) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn list_dangling_images(&self, _label: &str) -> Result<Vec<String>, RuntimeError> {
            Ok(Vec::new())
        }
    }

    fn state_with(runtime: Arc<StubRuntime>) -> Arc<AppState> {
        Arc::new(AppState {
            sandbox: Sandbox::new(runtime, SandboxConfig::default()),
            store: Arc::new(InMemorySubmissionStore::new()),
        })
    }

    fn request(language: &str, mode: Mode) -> ExecutionRequest {
        ExecutionRequest {
            language: language.to_string(),
            code: "def add(a, b):\n    return a + b\n".to_string(),
            snippet: None,
            test_cases: vec![TestCase::new("a=1;b=2", "3")],
            mode,
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    const PASSING_OUTPUT: &[u8] = b"[{'input': 'a=1;b=2', 'output': 3, 'expected': '3', 'result': True}]\n";

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(status_code(ExecutionStatus::Success), StatusCode::OK);
        assert_eq!(status_code(ExecutionStatus::UnsupportedLanguage), StatusCode::BAD_REQUEST);
        assert_eq!(status_code(ExecutionStatus::Timeout), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(status_code(ExecutionStatus::BuildError), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_code(ExecutionStatus::OutputParseError), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_unsupported_language_is_bad_request() {
        let runtime = Arc::new(StubRuntime::default());
        let response = execute(State(state_with(runtime.clone())), Json(request("cobol", Mode::Run))).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["status"], "unsupported_language");
        assert_eq!(runtime.builds.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_oversized_code_is_rejected_before_sandbox() {
        let runtime = Arc::new(StubRuntime::default());
        let mut req = request("python", Mode::Run);
        req.code = "x".repeat(MAX_SOURCE_CODE_BYTES + 1);

        let response = execute(State(state_with(runtime.clone())), Json(req)).await;

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(runtime.builds.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_build_failure_is_unprocessable() {
        let runtime = Arc::new(StubRuntime::default());
        let response = execute(State(state_with(runtime)), Json(request("python", Mode::Run))).await;

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["status"], "build_error");
        assert!(body["error"].as_str().unwrap().contains("no such base image"));
    }

    #[tokio::test]
    async fn test_successful_submit_is_recorded() {
        let runtime = Arc::new(StubRuntime {
            logs: Some(PASSING_OUTPUT.to_vec()),
            ..Default::default()
        });
        let state = state_with(runtime);

        let response = execute(State(state.clone()), Json(request("python", Mode::Submit))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let report: ExecutionReport = serde_json::from_value(body_json(response).await).unwrap();
        assert!(report.all_passed());

        let response = get_submission(State(state), Path(report.id.to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let stored = body_json(response).await;
        assert_eq!(stored["id"], report.id.to_string());
    }

    #[tokio::test]
    async fn test_run_is_not_recorded() {
        let runtime = Arc::new(StubRuntime {
            logs: Some(PASSING_OUTPUT.to_vec()),
            ..Default::default()
        });
        let state = state_with(runtime);

        let response = execute(State(state.clone()), Json(request("python", Mode::Run))).await;
        let report: ExecutionReport = serde_json::from_value(body_json(response).await).unwrap();

        assert!(state.store.get(report.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_submission_errors() {
        let state = state_with(Arc::new(StubRuntime::default()));

        let response = get_submission(State(state.clone()), Path("not-a-uuid".to_string())).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = get_submission(State(state), Path(Uuid::new_v4().to_string())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_languages_listing() {
        let Json(languages) = list_languages().await;
        let names: Vec<&str> = languages.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["python", "javascript", "go"]);
        assert_eq!(languages[2].entry_file, "main.go");
    }
}

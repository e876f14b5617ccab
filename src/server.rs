//! HTTP front end
//!
//! `POST /exec` takes `{ "code": ..., "language": ... }` and answers with an
//! [`ExecutionReport`]. Requests beyond the first wait in the engine's queue.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::engine::{Engine, ExecutionReport};
use crate::error::{Error, ErrorKind};

/// Body of `POST /exec`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecRequest {
    pub code: String,
    pub language: String,
}

#[derive(Serialize)]
struct LanguagesResponse<'a> {
    languages: Vec<&'a str>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    queued: usize,
    completed: u64,
    version: &'static str,
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::UnknownLanguage => StatusCode::BAD_REQUEST,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn exec(
    State(engine): State<Arc<Engine>>,
    payload: Result<Json<ExecRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            let body = serde_json::json!({ "error": rejection.body_text() });
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    };

    let result = engine.execute(&request.code, &request.language).await;
    let report = ExecutionReport::from_result(&result);

    match result {
        Ok(_) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => {
            if !e.is_client_error() {
                warn!("Failed running {}: {}", request.language, e);
            }
            (status_for(e.kind()), Json(report)).into_response()
        }
    }
}

async fn languages(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    let body = serde_json::to_value(LanguagesResponse {
        languages: engine.registry().ids(),
    })
    .map_err(Error::from);

    match body {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ExecutionReport::from_error(&e)),
        )
            .into_response(),
    }
}

async fn health(State(engine): State<Arc<Engine>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        queued: engine.queue().queued(),
        completed: engine.queue().turns(),
        version: crate::VERSION,
    })
}

/// Build the router around a shared engine
pub fn build_router(engine: Arc<Engine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([header::CONTENT_LENGTH]);

    Router::new()
        .route("/exec", post(exec))
        .route("/languages", get(languages))
        .route("/health", get(health))
        .with_state(engine)
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SandboxConfig;
    use crate::language::LanguageRegistry;
    use crate::sandbox::testing::RecordingRunner;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tempfile::tempdir;
    use tower::ServiceExt;

    fn router(root: &std::path::Path) -> Router {
        let config = SandboxConfig {
            temp_root: root.to_path_buf(),
            ..SandboxConfig::default()
        };
        let engine = Engine::new(
            Arc::new(LanguageRegistry::builtin()),
            Arc::new(RecordingRunner::default()),
            &config,
        );
        build_router(Arc::new(engine))
    }

    async fn post_exec(app: Router, body: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/exec")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_exec_success() {
        let root = tempdir().unwrap();
        let (status, body) = post_exec(
            router(root.path()),
            r#"{"code": "hello\n\n  world ", "language": "go"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "output": ["hello", "world"] }));
    }

    #[tokio::test]
    async fn test_exec_unknown_language() {
        let root = tempdir().unwrap();
        let (status, body) = post_exec(
            router(root.path()),
            r#"{"code": "x", "language": "cobol"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "unknown_language");
        assert_eq!(body["error"], "Unknown language cobol");
    }

    #[tokio::test]
    async fn test_exec_failure_keeps_output() {
        let root = tempdir().unwrap();
        let (status, body) = post_exec(
            router(root.path()),
            r#"{"code": "fail here", "language": "python3"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["kind"], "execution");
        assert_eq!(body["output"], serde_json::json!(["fail here"]));
    }

    #[tokio::test]
    async fn test_exec_rejects_bad_body() {
        let root = tempdir().unwrap();
        let (status, body) = post_exec(router(root.path()), r#"{"code": "x"}"#).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("language"));
    }

    #[tokio::test]
    async fn test_languages_and_health() {
        let root = tempdir().unwrap();
        let app = router(root.path());

        let response = app
            .clone()
            .oneshot(Request::get("/languages").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "languages": ["go", "java", "node", "python3"] })
        );

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["completed"], 0);
    }
}

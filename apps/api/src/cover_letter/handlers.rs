//! Axum route handlers for the cover letter API.

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use bytes::Bytes;
use tracing::{debug, info};

use crate::errors::AppError;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request types
// ────────────────────────────────────────────────────────────────────────────

/// Fields of the `POST /process-data` multipart form.
#[derive(Debug)]
pub struct ProcessDataForm {
    pub file_name: String,
    pub file: Bytes,
    pub text: String,
}

impl ProcessDataForm {
    /// Drains the multipart stream. Unknown fields are skipped.
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut file: Option<(String, Bytes)> = None;
        let mut text: Option<String> = None;

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or("").to_string();
            match name.as_str() {
                "file" => {
                    let file_name = field.file_name().unwrap_or("").to_string();
                    file = Some((file_name, field.bytes().await?));
                }
                "text" => text = Some(field.text().await?),
                other => debug!("Ignoring unexpected form field '{other}'"),
            }
        }

        let (file_name, file) = file
            .ok_or_else(|| AppError::Validation("missing required field: file".to_string()))?;
        let text =
            text.ok_or_else(|| AppError::Validation("missing required field: text".to_string()))?;

        if text.trim().is_empty() {
            return Err(AppError::Validation("text cannot be empty".to_string()));
        }
        if file.is_empty() {
            return Err(AppError::Validation("uploaded file is empty".to_string()));
        }

        Ok(Self {
            file_name,
            file,
            text,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /process-data
///
/// Stages the uploaded résumé, runs the cover-letter generator against it and the
/// job text, and returns the reply as a JSON string. The staged file is removed
/// whatever the outcome; if the request is dropped mid-flight, `StagedUpload`'s
/// `Drop` removes it instead.
///
/// Requests that are not `multipart/form-data` with a boundary are rejected
/// through `AppError` so the body keeps the `{"error": ...}` shape.
pub async fn handle_process_data(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<String>, AppError> {
    let form = ProcessDataForm::from_multipart(multipart?).await?;
    debug!("Job text: {}", form.text);

    let staged = state.uploads.stage(&form.file_name, &form.file).await?;
    info!(
        "Generating cover letter for {} ({} bytes)",
        staged.original_name(),
        form.file.len()
    );

    let result = state.generator.generate(&staged, &form.text).await;
    staged.remove().await;

    Ok(Json(result?))
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        response::Response,
    };
    use tower::ServiceExt;

    use crate::cover_letter::generator::CoverLetterGenerator;
    use crate::errors::AppError;
    use crate::routes::build_router;
    use crate::state::AppState;
    use crate::uploads::StagedUpload;

    const BOUNDARY: &str = "cover-letter-test-boundary";

    #[derive(Debug, Clone)]
    struct Call {
        path: PathBuf,
        existed: bool,
        content: Vec<u8>,
        original_name: String,
        job_text: String,
    }

    enum Outcome {
        Reply(&'static str),
        Fail(u16, &'static str),
        Hang,
    }

    /// Records what it was handed and answers with a canned outcome.
    struct MockGenerator {
        outcome: Outcome,
        calls: Mutex<Vec<Call>>,
    }

    impl MockGenerator {
        fn new(outcome: Outcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CoverLetterGenerator for MockGenerator {
        async fn generate(&self, resume: &StagedUpload, job_text: &str) -> Result<String, AppError> {
            self.calls.lock().unwrap().push(Call {
                path: resume.path().to_path_buf(),
                existed: resume.path().exists(),
                content: std::fs::read(resume.path()).unwrap_or_default(),
                original_name: resume.original_name().to_string(),
                job_text: job_text.to_string(),
            });

            match self.outcome {
                Outcome::Reply(text) => Ok(text.to_string()),
                Outcome::Fail(status, message) => Err(AppError::Provider {
                    status,
                    message: message.to_string(),
                }),
                Outcome::Hang => std::future::pending().await,
            }
        }
    }

    fn multipart_request(file: Option<(&str, &[u8])>, text: Option<&str>) -> Request<Body> {
        let mut body = Vec::new();
        if let Some((name, bytes)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: application/pdf\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        if let Some(text) = text {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"text\"\r\n\r\n{text}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/process-data")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> (StatusCode, serde_json::Value) {
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        (status, json)
    }

    fn upload_dir_entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn test_success_returns_reply_and_removes_upload() {
        let dir = tempfile::tempdir().unwrap();
        let generator = MockGenerator::new(Outcome::Reply("Dear Hiring Manager, ..."));
        let app = build_router(AppState::for_tests(dir.path(), generator.clone()));

        let response = app
            .oneshot(multipart_request(
                Some(("resume.pdf", b"%PDF-1.7 resume".as_slice())),
                Some("Rust engineer"),
            ))
            .await
            .unwrap();

        let (status, json) = json_body(response).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!("Dear Hiring Manager, ..."));

        let calls = generator.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].existed, "upload must exist while generating");
        assert_eq!(calls[0].content, b"%PDF-1.7 resume");
        assert_eq!(calls[0].original_name, "resume.pdf");
        assert_eq!(calls[0].job_text, "Rust engineer");
        assert!(calls[0].path.starts_with(dir.path()));
        assert!(!calls[0].path.exists(), "upload must be removed afterwards");
        assert_eq!(upload_dir_entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_generator_failure_passes_status_and_removes_upload() {
        let dir = tempfile::tempdir().unwrap();
        let generator = MockGenerator::new(Outcome::Fail(401, "Incorrect API key provided"));
        let app = build_router(AppState::for_tests(dir.path(), generator.clone()));

        let response = app
            .oneshot(multipart_request(
                Some(("resume.pdf", b"resume".as_slice())),
                Some("Rust engineer"),
            ))
            .await
            .unwrap();

        let (status, json) = json_body(response).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json, serde_json::json!({ "error": "Incorrect API key provided" }));

        let calls = generator.calls();
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].path.exists());
        assert_eq!(upload_dir_entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_missing_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let generator = MockGenerator::new(Outcome::Reply("unused"));
        let app = build_router(AppState::for_tests(dir.path(), generator.clone()));

        let response = app
            .oneshot(multipart_request(None, Some("Rust engineer")))
            .await
            .unwrap();

        let (status, json) = json_body(response).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json, serde_json::json!({ "error": "missing required field: file" }));
        assert!(generator.calls().is_empty());
        assert_eq!(upload_dir_entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_missing_text_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let generator = MockGenerator::new(Outcome::Reply("unused"));
        let app = build_router(AppState::for_tests(dir.path(), generator.clone()));

        let response = app
            .oneshot(multipart_request(Some(("resume.pdf", b"resume".as_slice())), None))
            .await
            .unwrap();

        let (status, json) = json_body(response).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json, serde_json::json!({ "error": "missing required field: text" }));
        assert!(generator.calls().is_empty());
        assert_eq!(upload_dir_entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_blank_text_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let generator = MockGenerator::new(Outcome::Reply("unused"));
        let app = build_router(AppState::for_tests(dir.path(), generator.clone()));

        let response = app
            .oneshot(multipart_request(Some(("resume.pdf", b"resume".as_slice())), Some("   ")))
            .await
            .unwrap();

        let (status, json) = json_body(response).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json, serde_json::json!({ "error": "text cannot be empty" }));
        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let generator = MockGenerator::new(Outcome::Reply("unused"));
        let app = build_router(AppState::for_tests(dir.path(), generator.clone()));

        let response = app
            .oneshot(multipart_request(Some(("resume.pdf", b"".as_slice())), Some("Rust engineer")))
            .await
            .unwrap();

        let (status, json) = json_body(response).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json, serde_json::json!({ "error": "uploaded file is empty" }));
        assert!(generator.calls().is_empty());
    }

    async fn post_raw(app: axum::Router, content_type: &str, body: &'static str) -> Response {
        app.oneshot(
            Request::builder()
                .method("POST")
                .uri("/process-data")
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_non_multipart_body_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let generator = MockGenerator::new(Outcome::Reply("unused"));
        let app = build_router(AppState::for_tests(dir.path(), generator.clone()));

        let response = post_raw(app, "application/json", r#"{"text":"Rust engineer"}"#).await;

        let (status, json) = json_body(response).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string(), "unexpected body: {json}");
        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    async fn test_multipart_without_boundary_is_rejected_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let generator = MockGenerator::new(Outcome::Reply("unused"));
        let app = build_router(AppState::for_tests(dir.path(), generator.clone()));

        let response = post_raw(app, "multipart/form-data", "file=resume.pdf").await;

        let (status, json) = json_body(response).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let message = json["error"].as_str().unwrap();
        assert!(message.contains("boundary"), "unexpected message: {message}");
        assert!(generator.calls().is_empty());
        assert_eq!(upload_dir_entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_truncated_multipart_stream_is_rejected_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let generator = MockGenerator::new(Outcome::Reply("unused"));
        let app = build_router(AppState::for_tests(dir.path(), generator.clone()));

        let response =
            post_raw(app, "multipart/form-data; boundary=b", "not a multipart body").await;

        let (status, json) = json_body(response).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string(), "unexpected body: {json}");
        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    async fn test_traversal_file_name_stays_in_upload_dir() {
        let dir = tempfile::tempdir().unwrap();
        let generator = MockGenerator::new(Outcome::Reply("ok"));
        let app = build_router(AppState::for_tests(dir.path(), generator.clone()));

        let response = app
            .oneshot(multipart_request(
                Some(("../../etc/resume.pdf", b"resume".as_slice())),
                Some("Rust engineer"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let calls = generator.calls();
        assert_eq!(calls[0].original_name, "resume.pdf");
        assert_eq!(calls[0].path.parent(), Some(dir.path()));
    }

    #[tokio::test]
    async fn test_concurrent_same_name_uploads_use_distinct_paths() {
        let dir = tempfile::tempdir().unwrap();
        let generator = MockGenerator::new(Outcome::Reply("ok"));
        let app = build_router(AppState::for_tests(dir.path(), generator.clone()));

        let requests = (0..16).map(|i| {
            let app = app.clone();
            async move {
                let text = format!("job {i}");
                app.oneshot(multipart_request(
                    Some(("resume.pdf", b"same resume".as_slice())),
                    Some(&text),
                ))
                .await
                .unwrap()
                .status()
            }
        });
        let statuses = futures_join_all(requests).await;
        assert!(statuses.iter().all(|s| *s == StatusCode::OK));

        let calls = generator.calls();
        assert_eq!(calls.len(), 16);
        let mut paths: Vec<_> = calls.iter().map(|c| c.path.clone()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 16);
        assert_eq!(upload_dir_entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_abandoned_request_still_removes_upload() {
        let dir = tempfile::tempdir().unwrap();
        let generator = MockGenerator::new(Outcome::Hang);
        let app = build_router(AppState::for_tests(dir.path(), generator.clone()));

        let result = tokio::time::timeout(
            Duration::from_millis(200),
            app.oneshot(multipart_request(
                Some(("resume.pdf", b"resume".as_slice())),
                Some("Rust engineer"),
            )),
        )
        .await;
        assert!(result.is_err(), "generator never finishes");

        let calls = generator.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].existed);
        assert!(!calls[0].path.exists());
        assert_eq!(upload_dir_entries(dir.path()), 0);
    }

    /// Runs the futures concurrently on spawned tasks and collects their outputs in order.
    async fn futures_join_all<F>(futures: impl Iterator<Item = F>) -> Vec<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handles: Vec<_> = futures.map(tokio::spawn).collect();
        let mut outputs = Vec::with_capacity(handles.len());
        for handle in handles {
            outputs.push(handle.await.unwrap());
        }
        outputs
    }
}

pub mod health;

use std::time::Duration;

use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequest, Request},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::applications::handlers as applications;
use crate::documents::handlers as documents;
use crate::errors::AppError;
use crate::jobs::Job;
use crate::state::AppState;

/// Room for multipart framing and the text fields around the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub job_id: Uuid,
    pub kind: &'static str,
}

/// JSON body that may be left out. An empty body yields `T::default()`; a body that is
/// present must parse, otherwise the request is rejected with 400.
pub struct OptionalJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for OptionalJson<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(req, state).await.map_err(|e| {
            if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                AppError::PayloadTooLarge(e.body_text())
            } else {
                AppError::Validation(e.body_text())
            }
        })?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(OptionalJson(T::default()));
        }
        serde_json::from_slice(&body)
            .map(OptionalJson)
            .map_err(|e| AppError::Validation(format!("Invalid JSON body: {e}")))
    }
}

/// Queues `job` for immediate execution and answers 202.
pub async fn accept_job(
    state: &AppState,
    job: Job,
) -> Result<(StatusCode, Json<JobAccepted>), AppError> {
    let kind = job.kind();
    let job_id = state.queue.submit(job, Duration::ZERO).await?;
    info!(%job_id, kind, "Job queued");
    Ok((StatusCode::ACCEPTED, Json(JobAccepted { job_id, kind })))
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health::health_handler))
        // Documents
        .route(
            "/api/v1/documents",
            get(documents::handle_list_documents).post(documents::handle_upload),
        )
        .route(
            "/api/v1/documents/bulk-process",
            post(documents::handle_bulk_process),
        )
        .route("/api/v1/documents/:id", get(documents::handle_get_document))
        .route(
            "/api/v1/documents/:id/reprocess",
            post(documents::handle_reprocess),
        )
        .route("/api/v1/profile", get(documents::handle_get_profile))
        // Applications
        .route(
            "/api/v1/applications",
            post(applications::handle_create_application),
        )
        .route(
            "/api/v1/applications/:id/scrape",
            post(applications::handle_scrape_application),
        )
        .route(
            "/api/v1/applications/:id/extract-questions",
            post(applications::handle_extract_questions),
        )
        .route(
            "/api/v1/applications/:id/questions",
            get(applications::handle_list_questions),
        )
        .route(
            "/api/v1/applications/:id/responses",
            post(applications::handle_batch_generate),
        )
        .route(
            "/api/v1/questions/:id/response",
            post(applications::handle_generate_response),
        )
        .route(
            "/api/v1/scrape/preview",
            post(applications::handle_scrape_preview),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::jobs::queue::InMemoryJobQueue;
    use crate::llm_client::testing::ScriptedGenerator;

    fn test_router() -> (Router, Arc<InMemoryJobQueue>) {
        let queue = Arc::new(InMemoryJobQueue::new());
        let state = AppState::for_tests(queue.clone(), Arc::new(ScriptedGenerator::new(["{}"])));
        (build_router(state), queue)
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (router, _) = test_router();
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "trackly-api");
    }

    #[tokio::test]
    async fn test_bulk_process_queues_one_job() {
        let (router, queue) = test_router();
        let ids = [Uuid::from_u128(1), Uuid::from_u128(2)];
        let body = serde_json::json!({ "document_ids": ids }).to_string();

        let response = router
            .oneshot(post_json("/api/v1/documents/bulk-process", &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json_body(response).await;
        assert_eq!(body["kind"], "bulk_process_documents");
        assert_eq!(
            queue.pending_jobs(),
            vec![Job::BulkProcessDocuments {
                document_ids: ids.to_vec()
            }]
        );
    }

    #[tokio::test]
    async fn test_empty_bulk_process_is_rejected() {
        let (router, queue) = test_router();
        let response = router
            .oneshot(post_json(
                "/api/v1/documents/bulk-process",
                r#"{"document_ids": []}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert!(queue.pending().is_empty());
    }

    #[tokio::test]
    async fn test_scrape_preview_rejects_bad_url() {
        let (router, _) = test_router();
        let response = router
            .oneshot(post_json("/api/v1/scrape/preview", r#"{"url": "not-a-url"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_requires_multipart() {
        let (router, queue) = test_router();
        let response = router
            .oneshot(post_json("/api/v1/documents", "{}"))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
        assert!(queue.pending().is_empty());
    }

    #[derive(Debug, Default, PartialEq, serde::Deserialize)]
    struct Flags {
        #[serde(default)]
        force: bool,
    }

    async fn extract_flags(body: &'static str) -> Result<Flags, AppError> {
        let request = Request::post("/").body(Body::from(body)).unwrap();
        OptionalJson::<Flags>::from_request(request, &())
            .await
            .map(|OptionalJson(flags)| flags)
    }

    #[tokio::test]
    async fn test_optional_json_defaults_only_when_absent() {
        assert_eq!(extract_flags("").await.unwrap(), Flags::default());
        assert_eq!(extract_flags("  \n").await.unwrap(), Flags::default());
        assert_eq!(extract_flags(r#"{"force": true}"#).await.unwrap(), Flags { force: true });
        assert!(matches!(
            extract_flags(r#"{"force": "yes"}"#).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(extract_flags("{").await, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_invalid_reprocess_body_is_rejected() {
        let (router, queue) = test_router();
        let uri = format!("/api/v1/documents/{}/reprocess", Uuid::from_u128(5));
        let response = router
            .oneshot(post_json(&uri, r#"{"force": "yes"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(queue.pending().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_path_id_is_rejected() {
        let (router, _) = test_router();
        let response = router
            .oneshot(
                Request::get("/api/v1/documents/not-a-uuid")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

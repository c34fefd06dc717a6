//! Router tests against in-memory backends and a scripted auth service.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use tower::ServiceExt;

use vconv_api::{create_router, ApiConfig, ApiError, ApiResult, AppState, Identity, IdentityValidator};
use vconv_models::{BlobId, JobMessage, Namespace};
use vconv_queue::{MemoryBroker, PipelineContext, QueueNames};
use vconv_storage::{ContentStore, MemoryBlobStore};

const BOUNDARY: &str = "vconv-test-boundary";

/// "Bearer admin" is an admin, "Bearer user" is not, anything else is
/// rejected.
struct ScriptedAuth;

#[async_trait]
impl IdentityValidator for ScriptedAuth {
    async fn validate(&self, authorization: &str) -> ApiResult<Identity> {
        match authorization {
            "Bearer admin" => Ok(Identity {
                username: "admin@example.com".to_string(),
                admin: true,
            }),
            "Bearer user" => Ok(Identity {
                username: "user@example.com".to_string(),
                admin: false,
            }),
            _ => Err(ApiError::unauthorized("invalid token")),
        }
    }

    async fn login(&self, authorization: &str) -> ApiResult<String> {
        if authorization == "Basic YWRtaW46cGFzcw==" {
            Ok("signed-token".to_string())
        } else {
            Err(ApiError::unauthorized("invalid credentials"))
        }
    }
}

struct TestApp {
    router: Router,
    store: Arc<MemoryBlobStore>,
    broker: Arc<MemoryBroker>,
}

fn test_app() -> TestApp {
    test_app_with(ApiConfig::default())
}

fn test_app_with(config: ApiConfig) -> TestApp {
    let store = Arc::new(MemoryBlobStore::new());
    let broker = Arc::new(MemoryBroker::new());
    let context = PipelineContext::new(store.clone(), broker.clone(), QueueNames::default());
    let state = AppState::new(config, context, Arc::new(ScriptedAuth));

    TestApp {
        router: create_router(state, None),
        store,
        broker,
    }
}

fn multipart_body(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, data) in files {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{name}.mp4\"\r\n").as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: video/mp4\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(token: Option<&str>, files: &[(&str, &[u8])]) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"));
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, token);
    }
    builder.body(Body::from(multipart_body(files))).unwrap()
}

fn download_request(token: &str, query: &str) -> Request<Body> {
    Request::builder()
        .uri(format!("/download{query}"))
        .header(header::AUTHORIZATION, token)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app();

    let response = app
        .router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(body_json(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_upload_enqueues_job() {
    let app = test_app();

    let response = app
        .router
        .oneshot(upload_request(Some("Bearer admin"), &[("video", b"video bytes")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let video_fid = BlobId::parse(body["video_fid"].as_str().unwrap()).unwrap();

    assert_eq!(
        app.store.get(Namespace::Videos, &video_fid).await.unwrap(),
        b"video bytes"
    );
    let queued = app.broker.ready("video").await;
    assert_eq!(queued.len(), 1);
    let job = JobMessage::from_slice(&queued[0].payload).unwrap();
    assert_eq!(job.video_fid, video_fid);
    assert_eq!(job.username, "admin@example.com");
    assert!(job.mp3_fid.is_none());
}

#[tokio::test]
async fn test_upload_requires_exactly_one_file() {
    let app = test_app();

    let text_only = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--{BOUNDARY}--\r\n"
    );
    let none = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload")
                .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
                .header(header::AUTHORIZATION, "Bearer admin")
                .body(Body::from(text_only))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(none.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(none).await["detail"], "Bad request: exactly 1 file required");

    let two = app
        .router
        .oneshot(upload_request(Some("Bearer admin"), &[("a", b"one"), ("b", b"two")]))
        .await
        .unwrap();
    assert_eq!(two.status(), StatusCode::BAD_REQUEST);

    assert!(app.store.is_empty(Namespace::Videos).await);
    assert!(app.broker.ready("video").await.is_empty());
}

#[tokio::test]
async fn test_upload_rejects_missing_invalid_and_non_admin_credentials() {
    let app = test_app();

    for token in [None, Some("Bearer forged"), Some("Bearer user")] {
        let response = app
            .router
            .clone()
            .oneshot(upload_request(token, &[("video", b"video bytes")]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "token {token:?}");
    }

    assert!(app.store.is_empty(Namespace::Videos).await);
    assert!(app.broker.ready("video").await.is_empty());
}

#[tokio::test]
async fn test_upload_broker_failure_is_500_and_removes_source() {
    let app = test_app();
    app.broker.fail_publishes_to("video", true).await;

    let response = app
        .router
        .oneshot(upload_request(Some("Bearer admin"), &[("video", b"video bytes")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(app.store.is_empty(Namespace::Videos).await);
}

#[tokio::test]
async fn test_download_serves_audio_attachment() {
    let app = test_app();
    let mp3_fid = app.store.put(Namespace::Mp3s, b"ID3 audio".to_vec()).await.unwrap();

    let response = app
        .router
        .oneshot(download_request("Bearer admin", &format!("?fid={mp3_fid}")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"{mp3_fid}.mp3\"").as_str()
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"ID3 audio");
}

#[tokio::test]
async fn test_download_errors() {
    let app = test_app();

    let missing = app
        .router
        .clone()
        .oneshot(download_request("Bearer admin", ""))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(missing).await["detail"], "Bad request: fid is required");

    let unknown = app
        .router
        .clone()
        .oneshot(download_request("Bearer admin", &format!("?fid={}", BlobId::new())))
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let malformed = app
        .router
        .clone()
        .oneshot(download_request("Bearer admin", "?fid=not-an-id"))
        .await
        .unwrap();
    assert_eq!(malformed.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let non_admin = app
        .router
        .oneshot(download_request("Bearer user", &format!("?fid={}", BlobId::new())))
        .await
        .unwrap();
    assert_eq!(non_admin.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_passes_through() {
    let app = test_app();

    let ok = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/login")
                .header(header::AUTHORIZATION, "Basic YWRtaW46cGFzcw==")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
    let bytes = to_bytes(ok.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"signed-token");

    let missing = app
        .router
        .oneshot(Request::builder().method("POST").uri("/login").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_ready_reports_broker_outage() {
    let app = test_app();

    let ready = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(ready.status(), StatusCode::OK);
    let body = body_json(ready).await;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["checks"]["broker"]["status"], "ok");
    assert_eq!(body["checks"]["storage"]["status"], "ok");

    app.broker.set_reachable(false);
    let degraded = app
        .router
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(degraded.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(degraded).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["checks"]["broker"]["status"], "error");
}

#[tokio::test]
async fn test_metrics_endpoint_only_when_enabled() {
    let disabled = test_app()
        .router
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(disabled.status(), StatusCode::NOT_FOUND);

    let store = Arc::new(MemoryBlobStore::new());
    let broker = Arc::new(MemoryBroker::new());
    let context = PipelineContext::new(store, broker, QueueNames::default());
    let state = AppState::new(ApiConfig::default(), context, Arc::new(ScriptedAuth));
    let handle = PrometheusBuilder::new().build_recorder().handle();

    let enabled = create_router(state, Some(handle))
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(enabled.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_internal_error_detail_follows_configured_environment() {
    let missing = format!("?fid={}", BlobId::new());

    let development = test_app()
        .router
        .oneshot(download_request("Bearer admin", &missing))
        .await
        .unwrap();
    assert_eq!(development.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let detail = body_json(development).await["detail"].as_str().unwrap().to_string();
    assert!(detail.starts_with("Storage error"), "detail: {detail}");

    let production = test_app_with(ApiConfig {
        environment: "production".to_string(),
        ..ApiConfig::default()
    });
    let masked = production
        .router
        .clone()
        .oneshot(download_request("Bearer admin", &missing))
        .await
        .unwrap();
    assert_eq!(masked.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(masked).await["detail"], "An internal error occurred");

    // Client errors keep their detail in production.
    let bad = production
        .router
        .oneshot(download_request("Bearer admin", ""))
        .await
        .unwrap();
    assert_eq!(body_json(bad).await["detail"], "Bad request: fid is required");
}

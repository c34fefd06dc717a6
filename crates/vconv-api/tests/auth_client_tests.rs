//! AuthServiceClient against a mock auth service.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vconv_api::{ApiConfig, ApiError, AuthServiceClient, IdentityValidator};

fn client_for(server: &MockServer) -> AuthServiceClient {
    let config = ApiConfig {
        auth_service_url: server.uri(),
        auth_timeout: Duration::from_secs(2),
        ..ApiConfig::default()
    };
    AuthServiceClient::new(&config).unwrap()
}

#[tokio::test]
async fn test_validate_returns_identity() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/validate"))
        .and(header("authorization", "Bearer good"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "username": "admin@example.com",
            "admin": true,
            "exp": 1_700_000_000,
            "iat": 1_690_000_000
        })))
        .mount(&server)
        .await;

    let identity = client_for(&server).validate("Bearer good").await.unwrap();
    assert_eq!(identity.username, "admin@example.com");
    assert!(identity.admin);
}

#[tokio::test]
async fn test_validate_rejection_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/validate"))
        .respond_with(ResponseTemplate::new(403).set_body_string("not authorized"))
        .mount(&server)
        .await;

    let err = client_for(&server).validate("Bearer expired").await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized(ref m) if m == "not authorized"));
}

#[tokio::test]
async fn test_auth_service_failure_is_internal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/validate"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = client_for(&server).validate("Bearer good").await.unwrap_err();
    assert!(matches!(err, ApiError::AuthService(_)));
}

#[tokio::test]
async fn test_login_returns_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(header("authorization", "Basic YWRtaW46cGFzcw=="))
        .respond_with(ResponseTemplate::new(200).set_body_string("eyJ.token"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid credentials"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert_eq!(client.login("Basic YWRtaW46cGFzcw==").await.unwrap(), "eyJ.token");

    let err = client.login("Basic d3Jvbmc=").await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized(_)));
}

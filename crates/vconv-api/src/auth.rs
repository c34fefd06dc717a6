//! Credential checks against the external auth service.
//!
//! The gateway never decodes tokens itself. Bearer tokens are POSTed to
//! `{AUTH_SERVICE_URL}/validate`, which answers with the caller's identity;
//! basic credentials are passed through to `{AUTH_SERVICE_URL}/login`.

use async_trait::async_trait;
use axum::http::{header, HeaderMap, StatusCode};
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};

/// Identity returned by the auth service for a valid token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Identity {
    pub username: String,
    #[serde(default)]
    pub admin: bool,
}

/// Validates credentials on behalf of the handlers.
#[async_trait]
pub trait IdentityValidator: Send + Sync {
    /// Resolve an `Authorization` header value to an identity.
    /// Rejected credentials are `ApiError::Unauthorized`.
    async fn validate(&self, authorization: &str) -> ApiResult<Identity>;

    /// Exchange basic credentials for a token.
    async fn login(&self, authorization: &str) -> ApiResult<String>;
}

/// Raw `Authorization` header, or 401.
pub fn authorization_header(headers: &HeaderMap) -> ApiResult<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::unauthorized("missing credentials"))
}

/// Validate the request's credentials and require the admin flag.
pub async fn require_admin(validator: &dyn IdentityValidator, headers: &HeaderMap) -> ApiResult<Identity> {
    let identity = validator.validate(authorization_header(headers)?).await?;
    if !identity.admin {
        warn!(username = %identity.username, "Rejected non-admin request");
        return Err(ApiError::unauthorized("not authorized"));
    }
    Ok(identity)
}

/// HTTP client for the auth service.
#[derive(Debug, Clone)]
pub struct AuthServiceClient {
    http: Client,
    base_url: String,
}

impl AuthServiceClient {
    pub fn new(config: &ApiConfig) -> ApiResult<Self> {
        let http = Client::builder()
            .timeout(config.auth_timeout)
            .connect_timeout(config.auth_timeout)
            .user_agent(concat!("vconv-api/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::auth_service(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.auth_service_url.clone(),
        })
    }

    async fn post(&self, path: &str, authorization: &str) -> ApiResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(|e| ApiError::auth_service(format!("{} unreachable: {}", url, e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            let detail = if body.trim().is_empty() {
                "invalid credentials".to_string()
            } else {
                body.trim().to_string()
            };
            return Err(ApiError::unauthorized(detail));
        }
        if !status.is_success() {
            return Err(ApiError::auth_service(format!("{} returned {}", url, status)));
        }
        Ok(response)
    }
}

#[async_trait]
impl IdentityValidator for AuthServiceClient {
    async fn validate(&self, authorization: &str) -> ApiResult<Identity> {
        self.post("/validate", authorization)
            .await?
            .json::<Identity>()
            .await
            .map_err(|e| ApiError::auth_service(format!("malformed identity: {}", e)))
    }

    async fn login(&self, authorization: &str) -> ApiResult<String> {
        self.post("/login", authorization)
            .await?
            .text()
            .await
            .map_err(|e| ApiError::auth_service(format!("malformed login response: {}", e)))
    }
}

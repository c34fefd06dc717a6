//! API error types.

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use vconv_queue::{ProduceError, QueueError};
use vconv_storage::StorageError;

use crate::state::AppState;

const INTERNAL_ERROR_DETAIL: &str = "An internal error occurred";

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Auth service error: {0}")]
    AuthService(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Produce(#[from] ProduceError),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn auth_service(msg: impl Into<String>) -> Self {
        Self::AuthService(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_)
            | ApiError::AuthService(_)
            | ApiError::Storage(_)
            | ApiError::Queue(_)
            | ApiError::Produce(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn is_internal(&self) -> bool {
        self.status_code() == StatusCode::INTERNAL_SERVER_ERROR
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

/// Marks a response rendered from an internal [`ApiError`].
#[derive(Debug, Clone, Copy)]
struct InternalErrorDetail;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            detail: self.to_string(),
            code: None,
        };

        let mut response = (status, Json(body)).into_response();
        if self.is_internal() {
            response.extensions_mut().insert(InternalErrorDetail);
        }
        response
    }
}

/// Replace the detail of internal error responses with a generic message
/// when running in production.
pub async fn mask_internal_errors(State(state): State<AppState>, request: Request<Body>, next: Next) -> Response {
    let response = next.run(request).await;
    if !state.config.is_production() || response.extensions().get::<InternalErrorDetail>().is_none() {
        return response;
    }

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    let body = ErrorResponse {
        detail: INTERNAL_ERROR_DETAIL.to_string(),
        code: None,
    };
    let masked = Json(body).into_response();
    Response::from_parts(parts, masked.into_body())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::unauthorized("x").status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::bad_request("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(QueueError::publish_failed("video", "down")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(ProduceError::Store(StorageError::upload_failed("down"))).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_only_internal_errors_are_marked() {
        let internal = ApiError::internal("secret-detail").into_response();
        assert!(internal.extensions().get::<InternalErrorDetail>().is_some());

        let rejected = ApiError::unauthorized("invalid token").into_response();
        assert!(rejected.extensions().get::<InternalErrorDetail>().is_none());
    }
}

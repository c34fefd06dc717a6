//! Converted audio download.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{info, warn};

use vconv_models::{BlobId, Namespace};

use crate::auth::require_admin;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub fid: Option<String>,
}

/// Serve a derived audio blob as an attachment named `<fid>.mp3`.
/// Any failure to resolve the id is a 500.
pub async fn download(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    let identity = require_admin(state.validator.as_ref(), &headers).await?;

    let fid = query
        .fid
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ApiError::bad_request("fid is required"))?;

    let id = BlobId::parse(&fid).map_err(|e| ApiError::internal(e.to_string()))?;
    let audio = state.context.store.get(Namespace::Mp3s, &id).await.map_err(|e| {
        warn!(mp3_fid = %id, "Download lookup failed: {}", e);
        ApiError::from(e)
    })?;

    info!(
        mp3_fid = %id,
        username = %identity.username,
        size_bytes = audio.len(),
        "Serving download"
    );

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}.mp3\"", id))
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("audio/mpeg")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from(audio),
    )
        .into_response())
}

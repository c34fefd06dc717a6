//! Video upload.

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;
use tracing::{error, info};

use crate::auth::require_admin;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: &'static str,
    pub video_fid: String,
}

/// Accept exactly one file from an admin and enqueue its conversion.
///
/// Credentials are checked before the body is read, so an unauthorized
/// caller gets 401 whatever it sent.
pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadResponse>> {
    let identity = require_admin(state.validator.as_ref(), &headers).await?;

    let mut multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let mut file = None;
    let mut file_count = 0usize;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        if field.file_name().is_none() {
            continue;
        }
        file_count += 1;
        if file_count > 1 {
            break;
        }
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        file = Some(data.to_vec());
    }

    let upload = match file {
        Some(data) if file_count == 1 => data,
        _ => return Err(ApiError::bad_request("exactly 1 file required")),
    };

    let size = upload.len();
    match state.producer.enqueue(upload, &identity.username).await {
        Ok(job) => {
            metrics::record_upload("accepted", size);
            info!(
                video_fid = %job.video_fid,
                username = %identity.username,
                "Upload accepted"
            );
            Ok(Json(UploadResponse {
                status: "success",
                video_fid: job.video_fid.to_string(),
            }))
        }
        Err(e) => {
            metrics::record_upload("failed", size);
            error!(username = %identity.username, "Upload failed: {}", e);
            Err(e.into())
        }
    }
}

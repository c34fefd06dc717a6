//! Login pass-through.

use axum::extract::State;
use axum::http::HeaderMap;

use crate::auth::authorization_header;
use crate::error::ApiResult;
use crate::state::AppState;

/// Forward basic credentials to the auth service and return its token.
pub async fn login(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<String> {
    let authorization = authorization_header(&headers)?;
    state.validator.login(authorization).await
}

//! Authentication middleware for emotrack-fusion
//!
//! Protected routes compare the `Authorization` header against the
//! configured key. With no key configured every request passes.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::error::ApiError;
use crate::AppState;

/// Authentication middleware
///
/// Applied to protected routes only; `/health` and `/buildinfo` skip it.
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.authorization_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    let provided = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::trim);

    if provided == Some(expected) {
        return Ok(next.run(request).await);
    }

    warn!(
        path = %request.uri().path(),
        header_present = provided.is_some(),
        "Rejected request with missing or wrong Authorization header"
    );
    Err(ApiError::Unauthorized)
}

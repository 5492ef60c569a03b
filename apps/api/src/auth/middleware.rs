//! Bearer-token authentication middleware.
//!
//! Applied to every route except `/auth/*`, `/health`, and the SSE stream
//! endpoint (which authenticates via a query parameter instead, since
//! EventSource cannot set headers).

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::auth::token::verify_access_token;
use crate::errors::AppError;
use crate::state::AppState;

/// The authenticated caller, inserted into request extensions on success.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: Uuid,
}

pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization token".to_string()))?;

    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .ok_or_else(|| AppError::Unauthorized("Invalid token: bad scheme".to_string()))?;

    let user_id = verify_access_token(&state.config.secret_key, token)
        .map_err(|e| AppError::Unauthorized(format!("Invalid token: {e}")))?;

    request.extensions_mut().insert(AuthUser { id: user_id });
    Ok(next.run(request).await)
}

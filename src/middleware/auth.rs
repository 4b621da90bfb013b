//! Admin API key authentication middleware.
//!
//! This middleware guards the privileged routes (the full transaction listing and
//! manual reconciliation). It:
//! 1. Extracts the API key from the Authorization header
//! 2. Hashes it and compares it with the digest of the configured admin key
//! 3. Rejects unauthorized requests with HTTP 401

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::{
    error::AppError,
    state::{AppState, hash_api_key},
};

/// Admin authentication middleware function.
///
/// # Flow
///
/// 1. Extract `Authorization: Bearer <key>` header from request
/// 2. Hash the `<key>` using SHA-256
/// 3. Compare with the configured admin key digest
/// 4. If equal: call next handler
/// 5. Otherwise (or when no admin key is configured): return 401 Unauthorized
///
/// # Headers
///
/// Expected header format:
/// ```text
/// Authorization: Bearer abc123xyz
/// ```
pub async fn admin_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let expected = state.admin_key_hash.as_deref().ok_or_else(|| {
        tracing::warn!("Privileged route called but ADMIN_API_KEY is not configured");
        AppError::Unauthorized
    })?;

    let api_key = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    if hash_api_key(api_key.trim()) != expected {
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}

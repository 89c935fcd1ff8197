use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::ApiError;
use crate::state::{AppState, blocking};

pub const API_KEY_HEADER: &str = "x-api-key";

/// Validate the bearer token against the token engine and stash its claims
/// in request extensions. Any failure here is a transport-level 401.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) =
        bearer.map_err(|_| ApiError::Unauthorized("authentication token not provided".into()))?;
    let token = bearer.token().to_string();

    let claims = blocking(move || state.tokens.validate_access(&token))
        .await
        .map_err(|e| match e {
            ApiError::Unauthenticated(reason) => {
                warn!(%reason, path = %req.uri().path(), "Bearer token rejected");
                ApiError::Unauthorized("token verification failed".into())
            }
            other => other,
        })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Guard for the admin surface: 401 without a key, 403 with the wrong one.
pub async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.api_key.as_deref() else {
        return Err(ApiError::Forbidden("admin API is disabled".into()));
    };

    let provided = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("API key is required".into()))?;

    if !keys_match(provided, expected) {
        warn!(path = %req.uri().path(), "Invalid API key");
        return Err(ApiError::Forbidden("invalid API key".into()));
    }

    Ok(next.run(req).await)
}

/// Compares fixed-size digests so the time taken does not depend on where the
/// keys first differ.
fn keys_match(provided: &str, expected: &str) -> bool {
    let a = Sha256::digest(provided.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_match() {
        assert!(keys_match("s3cret-admin-key", "s3cret-admin-key"));
        assert!(!keys_match("s3cret-admin-kez", "s3cret-admin-key"));
        assert!(!keys_match("s3cret", "s3cret-admin-key"));
        assert!(!keys_match("", "s3cret-admin-key"));
    }
}

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};

use mosaic_types::api::{
    Claims, Envelope, LoginRequest, LoginResponse, LogoutRequest, RefreshRequest,
    RefreshResponse, UserKeyInfo,
};

use crate::error::ApiError;
use crate::state::{AppState, blocking};

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<Envelope<LoginResponse>>, ApiError> {
    let Json(req) = payload?;

    let identifier = req.identifier().map(str::to_string);
    let password = req.password.filter(|p| !p.is_empty());
    let (Some(identifier), Some(password)) = (identifier, password) else {
        return Err(ApiError::Validation(
            "username/phone and password are required".into(),
        ));
    };

    let session = blocking(move || state.tokens.issue(&identifier, &password)).await?;

    let user = session.user;
    Ok(Json(Envelope::ok(LoginResponse {
        access_token: session.tokens.access_token,
        refresh_token: session.tokens.refresh_token,
        access_expires_at: session.tokens.access_expires_at,
        refresh_expires_at: session.tokens.refresh_expires_at,
        user_key_info: UserKeyInfo {
            name: user
                .name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| user.username.clone()),
            id: user.id,
            avatar: user.avatar,
            roles: session.roles,
        },
    })
    .with_success()))
}

/// GET /auth/check-token
///
/// Full two-phase validation. Failures keep transport 200 and carry the real
/// code inside the envelope.
pub async fn check_token(
    State(state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
) -> Result<Json<Envelope<Claims>>, ApiError> {
    let token = match bearer {
        Ok(TypedHeader(Authorization(bearer))) => bearer.token().to_string(),
        Err(rejection) if rejection.is_missing() => return Err(ApiError::MissingToken),
        Err(_) => return Err(ApiError::Unauthenticated(crate::AuthError::TokenMalformed)),
    };

    let claims = blocking(move || state.tokens.validate_access(&token)).await?;
    Ok(Json(Envelope::ok(claims).with_success()))
}

/// POST /auth/refresh-token
pub async fn refresh_token(
    State(state): State<AppState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<Envelope<RefreshResponse>>, ApiError> {
    let Json(req) = payload?;
    let token = req
        .token()
        .map(str::to_string)
        .ok_or_else(|| ApiError::Validation("token is required".into()))?;

    let row = blocking(move || state.tokens.rotate(&token)).await?;
    Ok(Json(Envelope::ok(RefreshResponse {
        access_token: row.access_token,
        refresh_token: row.refresh_token,
    })
    .with_success()))
}

/// POST /auth/logout
pub async fn logout(
    State(state): State<AppState>,
    payload: Result<Json<LogoutRequest>, JsonRejection>,
) -> Result<Json<Envelope<()>>, ApiError> {
    let Json(req) = payload?;
    let token = req
        .refresh_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Validation("refresh_token is required".into()))?;

    blocking(move || state.tokens.revoke(&token)).await?;
    Ok(Json(Envelope::message("logged out").with_success()))
}

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{debug, error, warn};

use mosaic_types::api::{ErrorBody, ErrorEnvelope};

/// Failures of the credential and token engine.
///
/// The three token classes stay distinct here so they can be logged apart,
/// even though they leave the process as one "unauthenticated" response.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("user not found")]
    NotFound,
    #[error("invalid credentials")]
    InvalidCredential,
    #[error("token malformed")]
    TokenMalformed,
    #[error("token expired")]
    TokenExpired,
    #[error("token revoked or superseded")]
    TokenRevoked,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("invalid credentials")]
    InvalidCredential,
    /// A presented token failed validation. Rendered as transport 200 with
    /// inner code 401.
    #[error("token is invalid or expired")]
    Unauthenticated(AuthError),
    /// `check-token` called without a token: transport 200, inner 400.
    #[error("token is required")]
    MissingToken,
    /// Transport-level 401 (no bearer on a protected route, no API key).
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Validation(String),
    #[error("upload failed: {0}")]
    UploadFailure(String),
    #[error("consistency check failed: {0}")]
    ConsistencyFailure(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// `(transport status, inner error code)`.
    pub fn codes(&self) -> (StatusCode, u16) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, 404),
            Self::InvalidCredential => (StatusCode::UNAUTHORIZED, 401),
            Self::Unauthenticated(_) => (StatusCode::OK, 401),
            Self::MissingToken => (StatusCode::OK, 400),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, 401),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, 403),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, 400),
            Self::UploadFailure(_) | Self::ConsistencyFailure(_) | Self::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, 500)
            }
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "Internal Server Error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::NotFound => Self::NotFound("user not found".into()),
            AuthError::InvalidCredential => Self::InvalidCredential,
            AuthError::Internal(e) => Self::Internal(e),
            token => Self::Unauthenticated(token),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.codes();

        match &self {
            Self::Internal(e) => error!("Internal error: {:#}", e),
            Self::UploadFailure(_) | Self::ConsistencyFailure(_) => error!("{}", self),
            Self::Unauthenticated(reason) => warn!(%reason, "Token rejected"),
            other => debug!(code, "Request failed: {}", other),
        }

        let stack = cfg!(debug_assertions).then(|| match &self {
            Self::Internal(e) => format!("{:?}", e),
            other => format!("{:?}", other),
        });

        let message = self.public_message();
        let body = ErrorEnvelope {
            code: status.as_u16(),
            message: message.clone(),
            error: ErrorBody {
                message,
                code,
                stack,
            },
        };

        (status, Json(body)).into_response()
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::DriveError;
use crate::models::GatewayErrorBody;
use crate::token::{CodecError, TokenError};

/// Ways a Gateway request can fail, each with a fixed status.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Missing authorization header")]
    MissingAuthorization,

    #[error("{0}")]
    BadRequest(String),

    #[error("Invalid token")]
    InvalidToken(#[source] CodecError),

    #[error("Token expired")]
    Expired,

    /// A file token used for a folder endpoint or the other way round.
    #[error("{0}")]
    ResourceMismatch(String),

    /// A resource outside what the token grants.
    #[error("{0}")]
    OutOfScope(String),

    #[error("Failed to acquire service credential")]
    ServiceCredential(#[source] DriveError),

    #[error("Upstream request failed: {0}")]
    Upstream(#[source] DriveError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<TokenError> for GatewayError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidToken(cause) => GatewayError::InvalidToken(cause),
            TokenError::Expired { .. } => GatewayError::Expired,
            TokenError::MissingField(_)
            | TokenError::InvalidTtl
            | TokenError::UnknownResourceType(_) => GatewayError::BadRequest(err.to_string()),
            TokenError::Signing(msg) => GatewayError::Internal(msg),
        }
    }
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::MissingAuthorization
            | GatewayError::InvalidToken(_)
            | GatewayError::Expired => StatusCode::UNAUTHORIZED,
            GatewayError::BadRequest(_) | GatewayError::ResourceMismatch(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::OutOfScope(_) => StatusCode::FORBIDDEN,
            GatewayError::ServiceCredential(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::Upstream(DriveError::ApiError { status, .. }) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn body(&self) -> GatewayErrorBody {
        let error = match self {
            GatewayError::Upstream(DriveError::ApiError { message, .. }) => message.clone(),
            other => other.to_string(),
        };
        GatewayErrorBody {
            error,
            expired: matches!(self, GatewayError::Expired).then_some(true),
            valid: matches!(self, GatewayError::InvalidToken(_)).then_some(false),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = ?self, "gateway request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %self, "gateway request rejected");
        }
        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(GatewayError::Expired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            GatewayError::InvalidToken(CodecError::InvalidSignature).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::ResourceMismatch("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(GatewayError::OutOfScope("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            GatewayError::Upstream(DriveError::ApiError {
                status: 404,
                message: "File not found".into()
            })
            .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::ServiceCredential(DriveError::TokenRefreshError("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_expired_and_invalid_bodies_differ() {
        let expired = GatewayError::Expired.body();
        assert_eq!(expired.expired, Some(true));
        assert_eq!(expired.valid, None);

        let invalid = GatewayError::from(TokenError::InvalidToken(CodecError::InvalidSignature)).body();
        assert_eq!(invalid.error, "Invalid token");
        assert_eq!(invalid.expired, None);
        assert_eq!(invalid.valid, Some(false));
    }
}

//! HTTP mapping for [`AuthError`].

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use super::types::ErrorResponse;
use crate::auth::{AuthError, OneTimeTokenError, TokenError};

/// Status code and stable `type` string for an error.
#[must_use]
pub fn classify(err: &AuthError) -> (StatusCode, &'static str) {
    match err {
        AuthError::Validation(_) => (StatusCode::BAD_REQUEST, "Validation"),
        AuthError::DuplicateEmail => (StatusCode::BAD_REQUEST, "DuplicateEmail"),
        AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "InvalidCredentials"),
        AuthError::InvalidToken(TokenError::Expired) => (StatusCode::UNAUTHORIZED, "ExpiredToken"),
        AuthError::InvalidToken(_) => (StatusCode::UNAUTHORIZED, "InvalidToken"),
        AuthError::ReusedToken => (StatusCode::FORBIDDEN, "ReusedToken"),
        AuthError::UserNotFound => (StatusCode::NOT_FOUND, "UserNotFound"),
        AuthError::AlreadyActivated => (StatusCode::CONFLICT, "AlreadyActivated"),
        AuthError::OneTimeToken(OneTimeTokenError::Expired) => {
            (StatusCode::BAD_REQUEST, "ExpiredToken")
        }
        AuthError::OneTimeToken(_) => (StatusCode::BAD_REQUEST, "InvalidToken"),
        AuthError::InvalidState => (StatusCode::BAD_REQUEST, "InvalidState"),
        AuthError::MismatchedProvider => (StatusCode::BAD_REQUEST, "MismatchedProvider"),
        AuthError::InvalidAccount => (StatusCode::FORBIDDEN, "InvalidAccount"),
        AuthError::Provider(_) => (StatusCode::BAD_GATEWAY, "ProviderError"),
        AuthError::CannotSendEmail(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CannotSendEmail"),
        AuthError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, kind) = classify(&self);
        let message = if self.is_client_error() {
            self.to_string()
        } else {
            error!("Request failed: {:#}", anyhow::Error::new(self));
            match status {
                StatusCode::BAD_GATEWAY => "identity provider unavailable".to_string(),
                _ => "internal server error".to_string(),
            }
        };

        (
            status,
            Json(ErrorResponse {
                kind: kind.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ProviderError;
    use anyhow::{Result, anyhow};

    async fn body(response: Response) -> Result<ErrorResponse> {
        let bytes = axum::body::to_bytes(response.into_body(), 4096).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    #[test]
    fn token_errors_split_expired_from_invalid() {
        assert_eq!(
            classify(&AuthError::InvalidToken(TokenError::Expired)),
            (StatusCode::UNAUTHORIZED, "ExpiredToken")
        );
        assert_eq!(
            classify(&AuthError::InvalidToken(TokenError::InvalidSignature)),
            (StatusCode::UNAUTHORIZED, "InvalidToken")
        );
        assert_eq!(
            classify(&AuthError::OneTimeToken(OneTimeTokenError::NotFound)),
            (StatusCode::BAD_REQUEST, "InvalidToken")
        );
    }

    #[test]
    fn reuse_is_forbidden_not_unauthorized() {
        assert_eq!(classify(&AuthError::ReusedToken).0, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn internal_errors_hide_details() -> Result<()> {
        let response = AuthError::Internal(anyhow!("connection refused: 10.0.0.7")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body(response).await?;
        assert_eq!(body.kind, "InternalError");
        assert!(!body.message.contains("10.0.0.7"));
        Ok(())
    }

    #[tokio::test]
    async fn provider_errors_are_bad_gateway() -> Result<()> {
        let response = AuthError::Provider(ProviderError::Timeout).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body(response).await?.kind, "ProviderError");
        Ok(())
    }

    #[tokio::test]
    async fn client_errors_carry_message() -> Result<()> {
        let response = AuthError::DuplicateEmail.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body(response).await?;
        assert_eq!(body.kind, "DuplicateEmail");
        assert_eq!(body.message, "email already registered");
        Ok(())
    }
}

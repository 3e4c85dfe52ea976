use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::{
    AuthState,
    types::{OneTimeTokenRequest, PasswordResetConfirmRequest, PasswordResetRequest},
};

/// Always `202` for a well-formed email, whether or not an account exists.
pub async fn request(
    auth_state: Extension<Arc<AuthState>>,
    Json(request): Json<PasswordResetRequest>,
) -> Response {
    match auth_state
        .service()
        .request_password_reset(&request.email)
        .await
    {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn verify(
    auth_state: Extension<Arc<AuthState>>,
    Json(request): Json<OneTimeTokenRequest>,
) -> Response {
    match auth_state
        .service()
        .verify_password_reset(request.user_id, &request.token)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn confirm(
    auth_state: Extension<Arc<AuthState>>,
    Json(request): Json<PasswordResetConfirmRequest>,
) -> Response {
    match auth_state
        .service()
        .reset_password(request.user_id, &request.token, &request.password)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

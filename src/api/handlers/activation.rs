//! Account activation by email.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::{AuthState, cookies::extract_bearer_token, types::OneTimeTokenRequest};
use crate::auth::{AuthError, TokenError};

/// Send an activation email to the caller's account.
pub async fn send(auth_state: Extension<Arc<AuthState>>, headers: HeaderMap) -> Response {
    let Some(access_token) = extract_bearer_token(&headers) else {
        return AuthError::InvalidToken(TokenError::Malformed).into_response();
    };
    let service = auth_state.service();
    let result = match service.authenticate(&access_token) {
        Ok(info) => service.send_activation_email(info.user_id).await,
        Err(err) => Err(err),
    };
    match result {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn confirm(
    auth_state: Extension<Arc<AuthState>>,
    Json(request): Json<OneTimeTokenRequest>,
) -> Response {
    match auth_state
        .service()
        .activate_account(request.user_id, &request.token)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

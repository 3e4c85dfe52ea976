//! Register, login, refresh and logout.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::error;

use super::{
    AuthState,
    cookies::{REFRESH_COOKIE_NAME, clear_refresh_cookie, extract_cookie, refresh_cookie},
    types::{CredentialsRequest, RefreshRequest, TokenResponse},
};
use crate::auth::{AuthError, TokenError, TokenPair};

pub async fn register(
    auth_state: Extension<Arc<AuthState>>,
    Json(request): Json<CredentialsRequest>,
) -> Response {
    match auth_state
        .service()
        .register(&request.email, &request.password)
        .await
    {
        Ok(tokens) => token_response(&auth_state, StatusCode::CREATED, &tokens),
        Err(err) => err.into_response(),
    }
}

pub async fn login(
    auth_state: Extension<Arc<AuthState>>,
    Json(request): Json<CredentialsRequest>,
) -> Response {
    match auth_state
        .service()
        .login(&request.email, &request.password)
        .await
    {
        Ok(tokens) => token_response(&auth_state, StatusCode::OK, &tokens),
        Err(err) => err.into_response(),
    }
}

pub async fn refresh(
    auth_state: Extension<Arc<AuthState>>,
    headers: HeaderMap,
    body: Option<Json<RefreshRequest>>,
) -> Response {
    let Some(refresh_token) = refresh_token_from(&headers, body) else {
        return AuthError::InvalidToken(TokenError::Malformed).into_response();
    };

    match auth_state.service().refresh(&refresh_token).await {
        Ok(tokens) => token_response(&auth_state, StatusCode::OK, &tokens),
        Err(err) => err.into_response(),
    }
}

/// Revoke the session and clear the cookie. The cookie is cleared even when
/// revocation fails.
pub async fn logout(
    auth_state: Extension<Arc<AuthState>>,
    headers: HeaderMap,
    body: Option<Json<RefreshRequest>>,
) -> Response {
    let result = match refresh_token_from(&headers, body) {
        Some(refresh_token) => auth_state.service().logout(&refresh_token).await,
        None => Err(AuthError::InvalidToken(TokenError::Malformed)),
    };

    let mut response = match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    };
    match clear_refresh_cookie(auth_state.cookie_secure()) {
        Ok(cookie) => {
            response.headers_mut().insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build refresh cookie: {err}"),
    }
    response
}

/// Body value first, cookie second.
fn refresh_token_from(headers: &HeaderMap, body: Option<Json<RefreshRequest>>) -> Option<String> {
    body.and_then(|Json(request)| request.refresh_token)
        .filter(|token| !token.is_empty())
        .or_else(|| extract_cookie(headers, REFRESH_COOKIE_NAME))
}

/// JSON token pair plus the refresh cookie.
pub(super) fn token_response(
    auth_state: &AuthState,
    status: StatusCode,
    tokens: &TokenPair,
) -> Response {
    let config = auth_state.service().config();
    let body = TokenResponse::new(tokens, config.access_token_ttl().num_seconds());

    let mut response_headers = HeaderMap::new();
    match refresh_cookie(
        &tokens.refresh_token.value,
        config.refresh_token_ttl_seconds(),
        auth_state.cookie_secure(),
    ) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build refresh cookie: {err}"),
    }

    (status, response_headers, Json(body)).into_response()
}

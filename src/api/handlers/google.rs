//! Google sign-in: redirect to the consent page, then hand tokens to the opener
//! window from the callback.

use axum::{
    extract::{Extension, Query},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE, LOCATION, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, error};

use super::{
    AuthState,
    cookies::{
        GOOGLE_STATE_COOKIE_NAME, clear_google_state_cookie, extract_cookie, google_state_cookie,
        refresh_cookie,
    },
    types::{OAuthCallbackQuery, TokenResponse},
};
use crate::auth::{AuthError, OAuthLogin};

pub async fn authorize(auth_state: Extension<Arc<AuthState>>) -> Response {
    let redirect = match auth_state.service().oauth_authorize() {
        Ok(redirect) => redirect,
        Err(err) => return err.into_response(),
    };

    let mut response_headers = HeaderMap::new();
    match HeaderValue::from_str(&redirect.authorization_url) {
        Ok(location) => {
            response_headers.insert(LOCATION, location);
        }
        Err(err) => {
            error!("Invalid authorization URL: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }
    match google_state_cookie(
        &redirect.state.value,
        auth_state.service().config().oauth_state_ttl_seconds(),
        auth_state.cookie_secure(),
    ) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build state cookie: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    (StatusCode::SEE_OTHER, response_headers).into_response()
}

pub async fn callback(
    auth_state: Extension<Arc<AuthState>>,
    headers: HeaderMap,
    Query(query): Query<OAuthCallbackQuery>,
) -> Response {
    if let Some(provider_error) = query.error {
        debug!("Google returned error: {provider_error}");
        return AuthError::Validation(format!("authorization denied: {provider_error}"))
            .into_response();
    }
    let (Some(code), Some(state)) = (query.code, query.state) else {
        return AuthError::Validation("missing code or state".to_string()).into_response();
    };

    // The state must come back to the browser that received it.
    if extract_cookie(&headers, GOOGLE_STATE_COOKIE_NAME).as_deref() != Some(state.as_str()) {
        return AuthError::InvalidState.into_response();
    }
    match auth_state.service().oauth_callback(&code, &state).await {
        Ok(login) => success_response(&auth_state, &login),
        Err(err) => err.into_response(),
    }
}

fn success_response(auth_state: &AuthState, login: &OAuthLogin) -> Response {
    let config = auth_state.service().config();
    let tokens = TokenResponse::new(&login.tokens, config.access_token_ttl().num_seconds());
    let page = match success_page(&tokens, auth_state.frontend_origin()) {
        Ok(page) => page,
        Err(err) => {
            error!("Failed to render callback page: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let secure = auth_state.cookie_secure();
    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response_headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    let cookies = [
        clear_google_state_cookie(secure),
        refresh_cookie(
            &login.tokens.refresh_token.value,
            config.refresh_token_ttl_seconds(),
            secure,
        ),
    ];
    for cookie in cookies {
        match cookie {
            Ok(cookie) => {
                response_headers.append(SET_COOKIE, cookie);
            }
            Err(err) => error!("Failed to build cookie: {err}"),
        }
    }

    (StatusCode::OK, response_headers, page).into_response()
}

/// Page that posts the tokens to `target_origin` only, then closes the popup.
fn success_page(tokens: &TokenResponse, target_origin: &str) -> serde_json::Result<String> {
    // "</" inside the JSON would end the script element early.
    let payload = serde_json::to_string(tokens)?.replace("</", "<\\/");
    let origin = serde_json::to_string(target_origin)?.replace("</", "<\\/");
    Ok(format!(
        r"<!doctype html>
<html>
<head><meta charset='utf-8'><title>Google sign-in</title></head>
<body>
<script>
  if (window.opener) {{
    window.opener.postMessage({payload}, {origin});
  }}
  window.close();
</script>
</body>
</html>
"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn tokens() -> TokenResponse {
        TokenResponse {
            access_token: "access.jwt.value".to_string(),
            refresh_token: "refresh.jwt.value".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: 900,
        }
    }

    #[test]
    fn success_page_targets_configured_origin() -> Result<()> {
        let page = success_page(&tokens(), "https://app.example.com")?;
        assert!(page.contains(r#""https://app.example.com""#));
        assert!(page.contains(r#""accessToken":"access.jwt.value""#));
        assert!(!page.contains("'*'"));
        Ok(())
    }

    #[test]
    fn success_page_escapes_script_terminator() -> Result<()> {
        let page = success_page(&tokens(), "https://x.test</script><script>alert(1)")?;
        assert!(!page.contains("</script><script>"));
        Ok(())
    }
}

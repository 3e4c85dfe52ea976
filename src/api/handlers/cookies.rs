//! Refresh and OAuth state cookies, plus token extraction from requests.

use axum::http::{
    HeaderMap, HeaderValue,
    header::{AUTHORIZATION, COOKIE, InvalidHeaderValue},
};

pub const REFRESH_COOKIE_NAME: &str = "refresh_token";
pub const GOOGLE_STATE_COOKIE_NAME: &str = "google_auth";

const REFRESH_COOKIE_PATH: &str = "/auth";
const GOOGLE_STATE_COOKIE_PATH: &str = "/auth/google";

fn cookie(
    name: &str,
    value: &str,
    path: &str,
    max_age_seconds: i64,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie =
        format!("{name}={value}; Path={path}; HttpOnly; SameSite=Lax; Max-Age={max_age_seconds}");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// `HttpOnly` cookie holding the refresh token, scoped to the auth routes.
pub fn refresh_cookie(
    token: &str,
    ttl_seconds: i64,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    cookie(REFRESH_COOKIE_NAME, token, REFRESH_COOKIE_PATH, ttl_seconds, secure)
}

pub fn clear_refresh_cookie(secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    cookie(REFRESH_COOKIE_NAME, "", REFRESH_COOKIE_PATH, 0, secure)
}

/// Binds the OAuth state to the browser that started the flow.
pub fn google_state_cookie(
    state: &str,
    ttl_seconds: i64,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    cookie(
        GOOGLE_STATE_COOKIE_NAME,
        state,
        GOOGLE_STATE_COOKIE_PATH,
        ttl_seconds,
        secure,
    )
}

pub fn clear_google_state_cookie(secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    cookie(GOOGLE_STATE_COOKIE_NAME, "", GOOGLE_STATE_COOKIE_PATH, 0, secure)
}

pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            let val = val.trim();
            if key.trim() == name && !val.is_empty() {
                return Some(val.to_string());
            }
        }
    }
    None
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

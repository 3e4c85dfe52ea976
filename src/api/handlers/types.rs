//! Request/response types for the HTTP surface.

use serde::{Deserialize, Serialize};

use crate::auth::TokenPair;

#[derive(Serialize, Deserialize, Debug)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

/// Body of refresh and logout. The token may come from the cookie instead.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl TokenResponse {
    #[must_use]
    pub fn new(tokens: &TokenPair, expires_in: i64) -> Self {
        Self {
            access_token: tokens.access_token.value.clone(),
            refresh_token: tokens.refresh_token.value.clone(),
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct OneTimeTokenRequest {
    pub user_id: i64,
    pub token: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PasswordResetConfirmRequest {
    pub user_id: i64,
    pub token: String,
    pub password: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ErrorResponse {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

//! OAuth2 provider abstraction and the encrypted state token.
//!
//! The state token travels to the provider and back as the `state` parameter. It is
//! a JWE, so the client can neither read nor alter the host and provider it binds.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::token::{Token, TokenCodec, TokenError};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request timed out")]
    Timeout,

    #[error("provider returned status {status}")]
    Status { status: u16 },

    #[error("provider request failed: {0}")]
    Transport(String),

    #[error("unexpected provider response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Identity as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider_user_id: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub name: Option<String>,
}

/// Authorization-code grant against one external identity provider.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Name bound into state tokens, e.g. `google`.
    fn name(&self) -> &'static str;

    /// Consent page URL carrying `state`.
    fn authorization_url(&self, state: &str) -> String;

    /// Exchange an authorization code for a provider access token.
    async fn exchange_code(&self, code: &str) -> Result<SecretString, ProviderError>;

    async fn fetch_profile(
        &self,
        access_token: &SecretString,
    ) -> Result<ProviderProfile, ProviderError>;
}

/// Flow context carried across the provider round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateClaims {
    pub request_host: String,
    pub auth_provider: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("invalid state token")]
    Invalid(#[source] TokenError),

    #[error("state token issued for another provider")]
    MismatchedProvider,
}

/// Encrypt a state token for `provider` that expires after `ttl`.
///
/// # Errors
/// Returns `TokenError::Encoding` if encryption fails.
pub fn create_state_token(
    codec: &TokenCodec,
    request_host: &str,
    provider: &str,
    ttl: Duration,
) -> Result<Token<StateClaims>, TokenError> {
    codec.encrypt(
        StateClaims {
            request_host: request_host.to_string(),
            auth_provider: provider.to_string(),
        },
        Utc::now() + ttl,
    )
}

/// Decrypt `token` and check it was issued for `expected_provider`.
///
/// # Errors
/// `Invalid` on any codec failure, `MismatchedProvider` on a provider mismatch.
pub fn validate_state_token(
    codec: &TokenCodec,
    token: &str,
    expected_provider: &str,
) -> Result<StateClaims, StateError> {
    let claims = codec
        .decrypt::<StateClaims>(token)
        .map_err(StateError::Invalid)?;
    if claims.payload.auth_provider != expected_provider {
        return Err(StateError::MismatchedProvider);
    }
    Ok(claims.payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::{ENCRYPTION_KEY_LEN, MIN_SIGNING_KEY_LEN};
    use anyhow::Result;

    fn codec() -> Result<TokenCodec> {
        Ok(TokenCodec::new(
            &SecretString::from("s".repeat(MIN_SIGNING_KEY_LEN)),
            &SecretString::from("e".repeat(ENCRYPTION_KEY_LEN)),
        )?)
    }

    #[test]
    fn state_token_validates_for_same_provider() -> Result<()> {
        let codec = codec()?;
        let token = create_state_token(
            &codec,
            "https://app.example.com",
            "google",
            Duration::minutes(15),
        )?;

        let claims = validate_state_token(&codec, &token.value, "google")?;
        assert_eq!(claims.request_host, "https://app.example.com");
        assert_eq!(claims.auth_provider, "google");
        Ok(())
    }

    #[test]
    fn state_token_rejects_other_provider() -> Result<()> {
        let codec = codec()?;
        let token = create_state_token(
            &codec,
            "https://app.example.com",
            "google",
            Duration::minutes(15),
        )?;

        assert_eq!(
            validate_state_token(&codec, &token.value, "facebook").err(),
            Some(StateError::MismatchedProvider)
        );
        Ok(())
    }

    #[test]
    fn state_token_rejects_expired_and_garbage() -> Result<()> {
        let codec = codec()?;
        let expired = create_state_token(
            &codec,
            "https://app.example.com",
            "google",
            Duration::seconds(-5),
        )?;

        assert_eq!(
            validate_state_token(&codec, &expired.value, "google").err(),
            Some(StateError::Invalid(TokenError::Expired))
        );
        assert!(matches!(
            validate_state_token(&codec, "garbage", "google"),
            Err(StateError::Invalid(_))
        ));
        Ok(())
    }
}

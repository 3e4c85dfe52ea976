//! Google `OAuth2` provider (authorization-code grant, v2 userinfo).

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::oauth::{OAuthProvider, ProviderError, ProviderProfile};
use crate::APP_USER_AGENT;

pub const PROVIDER_NAME: &str = "google";

const AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

const SCOPES: &str =
    "https://www.googleapis.com/auth/userinfo.email https://www.googleapis.com/auth/userinfo.profile";

/// Provider endpoints; overridable so tests can point at a mock server.
#[derive(Clone, Debug)]
pub struct GoogleEndpoints {
    pub authorization: String,
    pub token: String,
    pub userinfo: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            authorization: AUTHORIZATION_ENDPOINT.to_string(),
            token: TOKEN_ENDPOINT.to_string(),
            userinfo: USERINFO_ENDPOINT.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: String,
    email: Option<String>,
    #[serde(default)]
    verified_email: bool,
    name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct GoogleProvider {
    client_id: String,
    client_secret: SecretString,
    redirect_url: String,
    authorization_url: Url,
    token_url: String,
    userinfo_url: String,
    http_client: Client,
}

impl GoogleProvider {
    /// Build a provider whose outbound requests give up after `timeout`.
    ///
    /// # Errors
    /// Returns an error if an endpoint is not a valid URL or the HTTP client
    /// cannot be built.
    pub fn new(
        client_id: String,
        client_secret: SecretString,
        redirect_url: String,
        timeout: Duration,
        endpoints: GoogleEndpoints,
    ) -> Result<Self> {
        let authorization_url = Url::parse(&endpoints.authorization)
            .with_context(|| format!("invalid authorization endpoint: {}", endpoints.authorization))?;
        let http_client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            client_id,
            client_secret,
            redirect_url,
            authorization_url,
            token_url: endpoints.token,
            userinfo_url: endpoints.userinfo,
            http_client,
        })
    }

    /// Redirect URL registered with Google: `{public_url}/auth/google/callback`.
    #[must_use]
    pub fn callback_url(public_url: &str) -> String {
        format!("{}/auth/google/callback", public_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn authorization_url(&self, state: &str) -> String {
        let mut url = self.authorization_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_url)
            .append_pair("response_type", "code")
            .append_pair("scope", SCOPES)
            .append_pair("state", state);
        url.into()
    }

    async fn exchange_code(&self, code: &str) -> Result<SecretString, ProviderError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_url.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
            });
        }

        let token: GoogleTokenResponse = response.json().await?;
        Ok(SecretString::from(token.access_token))
    }

    async fn fetch_profile(
        &self,
        access_token: &SecretString,
    ) -> Result<ProviderProfile, ProviderError> {
        let response = self
            .http_client
            .get(&self.userinfo_url)
            .bearer_auth(access_token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
            });
        }

        let info: GoogleUserInfo = response.json().await?;
        Ok(ProviderProfile {
            provider_user_id: info.id,
            email: info.email,
            email_verified: info.verified_email,
            name: info.name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> Result<GoogleProvider> {
        GoogleProvider::new(
            "client-id".to_string(),
            SecretString::from("client-secret"),
            GoogleProvider::callback_url("https://api.example.com/"),
            Duration::from_secs(10),
            GoogleEndpoints::default(),
        )
    }

    #[test]
    fn callback_url_trims_trailing_slash() {
        assert_eq!(
            GoogleProvider::callback_url("https://api.example.com/"),
            "https://api.example.com/auth/google/callback"
        );
    }

    #[test]
    fn authorization_url_carries_state_and_scopes() -> Result<()> {
        let url = Url::parse(&provider()?.authorization_url("state.token"))?;
        assert_eq!(url.host_str(), Some("accounts.google.com"));

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let get = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("client_id"), Some("client-id"));
        assert_eq!(
            get("redirect_uri"),
            Some("https://api.example.com/auth/google/callback")
        );
        assert_eq!(get("response_type"), Some("code"));
        assert_eq!(get("state"), Some("state.token"));
        assert_eq!(get("scope"), Some(SCOPES));
        Ok(())
    }

    #[test]
    fn new_rejects_invalid_endpoint() {
        let endpoints = GoogleEndpoints {
            authorization: "not a url".to_string(),
            ..GoogleEndpoints::default()
        };
        let result = GoogleProvider::new(
            "client-id".to_string(),
            SecretString::from("client-secret"),
            "https://api.example.com/auth/google/callback".to_string(),
            Duration::from_secs(10),
            endpoints,
        );
        assert!(result.is_err());
    }
}

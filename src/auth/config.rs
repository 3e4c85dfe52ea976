//! Runtime configuration for the auth core.

use chrono::Duration;
use url::Url;

use super::one_time::TokenPurpose;

const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_OAUTH_STATE_TTL_SECONDS: i64 = 15 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    public_url: String,
    activation_callback_url: String,
    password_reset_callback_url: String,
    access_token_ttl_seconds: i64,
    refresh_token_ttl_seconds: i64,
    oauth_state_ttl_seconds: i64,
    activation_token_ttl_seconds: i64,
    password_reset_token_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(
        public_url: String,
        activation_callback_url: String,
        password_reset_callback_url: String,
    ) -> Self {
        Self {
            public_url,
            activation_callback_url,
            password_reset_callback_url,
            access_token_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            refresh_token_ttl_seconds: DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
            oauth_state_ttl_seconds: DEFAULT_OAUTH_STATE_TTL_SECONDS,
            activation_token_ttl_seconds: TokenPurpose::Activation.default_ttl_seconds(),
            password_reset_token_ttl_seconds: TokenPurpose::PasswordReset.default_ttl_seconds(),
        }
    }

    #[must_use]
    pub fn with_access_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_oauth_state_ttl_seconds(mut self, seconds: i64) -> Self {
        self.oauth_state_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_activation_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.activation_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_password_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.password_reset_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    #[must_use]
    pub fn activation_callback_url(&self) -> &str {
        &self.activation_callback_url
    }

    #[must_use]
    pub fn password_reset_callback_url(&self) -> &str {
        &self.password_reset_callback_url
    }

    #[must_use]
    pub fn access_token_ttl(&self) -> Duration {
        Duration::seconds(self.access_token_ttl_seconds)
    }

    #[must_use]
    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::seconds(self.refresh_token_ttl_seconds)
    }

    #[must_use]
    pub fn refresh_token_ttl_seconds(&self) -> i64 {
        self.refresh_token_ttl_seconds
    }

    #[must_use]
    pub fn oauth_state_ttl(&self) -> Duration {
        Duration::seconds(self.oauth_state_ttl_seconds)
    }

    #[must_use]
    pub fn oauth_state_ttl_seconds(&self) -> i64 {
        self.oauth_state_ttl_seconds
    }

    #[must_use]
    pub fn one_time_token_ttl_seconds(&self, purpose: TokenPurpose) -> i64 {
        match purpose {
            TokenPurpose::Activation => self.activation_token_ttl_seconds,
            TokenPurpose::PasswordReset => self.password_reset_token_ttl_seconds,
        }
    }

    /// `host[:port]` of the public URL. OAuth state tokens are bound to it, since the
    /// provider always redirects back to `{public_url}/auth/google/callback`.
    #[must_use]
    pub fn public_host(&self) -> Option<String> {
        let url = Url::parse(&self.public_url).ok()?;
        let host = url.host_str()?;
        Some(match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }

    /// Only mark cookies secure when the API is served over HTTPS.
    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        Url::parse(&self.public_url).is_ok_and(|url| url.scheme() == "https")
    }
}

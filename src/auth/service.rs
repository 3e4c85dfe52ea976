//! Auth flows composed from the codec, credential store, session ledger and
//! one-time token service.
//!
//! Nothing here knows about HTTP. Callers pass plain values and get either a
//! payload or an [`AuthError`]; status codes and cookies belong to the API layer.

use anyhow::{Context, anyhow};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::AuthConfig;
use super::credentials::CredentialStore;
use super::error::AuthError;
use super::oauth::{
    OAuthProvider, ProviderProfile, StateClaims, create_state_token, validate_state_token,
};
use super::one_time::{OneTimeTokenService, TokenPurpose};
use super::session::{LedgerError, SessionLedger};
use super::token::{Claims, Token, TokenCodec, TokenError};
use super::utils::{build_callback_url, normalize_email, valid_email, valid_password};
use crate::email::{EmailSender, activation_email, password_reset_email};
use crate::store::{CreateUserOutcome, OneTimeTokenStore, SessionStore, User, UserStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Payload of access and refresh tokens.
///
/// `jti` keeps two tokens for the same user issued within the same second distinct,
/// which the session ledger depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInfo {
    pub user_id: i64,
    pub is_activated: bool,
    pub typ: TokenKind,
    pub jti: Uuid,
}

impl AuthInfo {
    fn new(user: &User, typ: TokenKind) -> Self {
        Self {
            user_id: user.id,
            is_activated: user.is_activated,
            typ,
            jti: Uuid::new_v4(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: Token<AuthInfo>,
    pub refresh_token: Token<AuthInfo>,
}

/// Where to send the browser to start a provider login.
#[derive(Debug, Clone)]
pub struct OAuthRedirect {
    pub authorization_url: String,
    pub state: Token<StateClaims>,
}

/// Result of a completed provider login.
#[derive(Debug, Clone)]
pub struct OAuthLogin {
    pub tokens: TokenPair,
    pub user_id: i64,
    /// Public host the state token was bound to.
    pub request_host: String,
}

pub struct AuthService {
    config: AuthConfig,
    codec: Arc<TokenCodec>,
    credentials: CredentialStore,
    users: Arc<dyn UserStore>,
    sessions: SessionLedger,
    one_time: OneTimeTokenService,
    mailer: Arc<dyn EmailSender>,
    provider: Arc<dyn OAuthProvider>,
}

impl AuthService {
    #[must_use]
    pub fn new<S>(
        config: AuthConfig,
        codec: TokenCodec,
        credentials: CredentialStore,
        store: Arc<S>,
        mailer: Arc<dyn EmailSender>,
        provider: Arc<dyn OAuthProvider>,
    ) -> Self
    where
        S: UserStore + SessionStore + OneTimeTokenStore + 'static,
    {
        let users: Arc<dyn UserStore> = store.clone();
        let sessions: Arc<dyn SessionStore> = store.clone();
        let tokens: Arc<dyn OneTimeTokenStore> = store;

        let one_time = OneTimeTokenService::new(tokens, credentials.clone())
            .with_ttl_seconds(
                TokenPurpose::Activation,
                config.one_time_token_ttl_seconds(TokenPurpose::Activation),
            )
            .with_ttl_seconds(
                TokenPurpose::PasswordReset,
                config.one_time_token_ttl_seconds(TokenPurpose::PasswordReset),
            );

        Self {
            config,
            codec: Arc::new(codec),
            credentials,
            users,
            sessions: SessionLedger::new(sessions),
            one_time,
            mailer,
            provider,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Create a password account and open its first session.
    ///
    /// # Errors
    /// `Validation` for a malformed email or password, `DuplicateEmail` if the email
    /// is taken.
    pub async fn register(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(AuthError::Validation("invalid email address".to_string()));
        }
        if !valid_password(password) {
            return Err(AuthError::Validation(
                "password must be 6 to 30 printable characters without spaces".to_string(),
            ));
        }

        let password_hash = self.hash_password(password).await?;
        let user = match self.users.create_user(&email, &password_hash).await? {
            CreateUserOutcome::Created(user) => user,
            CreateUserOutcome::Conflict => return Err(AuthError::DuplicateEmail),
        };
        info!(user_id = user.id, "user registered");

        self.start_session(&user).await
    }

    /// Open a session for a password account.
    ///
    /// # Errors
    /// `InvalidCredentials` for an unknown email, an account without a password, or
    /// a wrong password alike.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let email = normalize_email(email);
        let user = self.users.find_user_by_email(&email).await?;
        let Some((user, password_hash)) =
            user.and_then(|user| user.password_hash.clone().map(|hash| (user, hash)))
        else {
            self.verify_dummy_password(password).await?;
            return Err(AuthError::InvalidCredentials);
        };

        if !self.verify_password(password, &password_hash).await? {
            return Err(AuthError::InvalidCredentials);
        }
        debug!(user_id = user.id, "user logged in");

        self.start_session(&user).await
    }

    /// Trade a live refresh token for a new pair, rotating the session.
    ///
    /// # Errors
    /// `InvalidToken` on any codec failure, `ReusedToken` if the token is not the
    /// live one for its session.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.verify_kind(refresh_token, TokenKind::Refresh)?;
        let user_id = claims.payload.user_id;
        let user = self
            .users
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let pair = self.issue_token_pair(&user).await?;
        let rotated = self
            .sessions
            .rotate(
                user_id,
                refresh_token,
                &pair.refresh_token.value,
                pair.refresh_token.claims.expires_at(),
            )
            .await;

        match rotated {
            Ok(()) => Ok(pair),
            Err(LedgerError::ReuseOrUnknownToken) => {
                warn!(user_id, "refresh token reuse detected");
                Err(AuthError::ReusedToken)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Revoke the session holding `refresh_token`.
    ///
    /// # Errors
    /// `InvalidToken` on any codec failure, `ReusedToken` if no session matched.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        let claims = self.verify_kind(refresh_token, TokenKind::Refresh)?;
        let user_id = claims.payload.user_id;

        match self.sessions.revoke(user_id, refresh_token).await {
            Ok(()) => {
                debug!(user_id, "session revoked");
                Ok(())
            }
            Err(LedgerError::ReuseOrUnknownToken) => {
                warn!(user_id, "logout with unknown or rotated refresh token");
                Err(AuthError::ReusedToken)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Validate an access token presented on an API call.
    ///
    /// # Errors
    /// `InvalidToken` on any codec failure or when given a refresh token.
    pub fn authenticate(&self, access_token: &str) -> Result<AuthInfo, AuthError> {
        Ok(self.verify_kind(access_token, TokenKind::Access)?.payload)
    }

    /// Start a provider login. The state token is bound to the public host, where
    /// the provider sends the browser back.
    ///
    /// # Errors
    /// `Internal` if the public URL has no host or the state token cannot be
    /// encrypted.
    pub fn oauth_authorize(&self) -> Result<OAuthRedirect, AuthError> {
        let public_host = self.public_host()?;
        let state = create_state_token(
            &self.codec,
            &public_host,
            self.provider.name(),
            self.config.oauth_state_ttl(),
        )
        .map_err(token_failure)?;
        let authorization_url = self.provider.authorization_url(&state.value);
        Ok(OAuthRedirect {
            authorization_url,
            state,
        })
    }

    /// Finish a provider login: validate state, fetch the profile, resolve the local
    /// account and open a session.
    ///
    /// # Errors
    /// `InvalidState`/`MismatchedProvider` for a bad state token or one bound to
    /// another host, `Provider` when the provider call fails or times out,
    /// `InvalidAccount` for an unverified email.
    pub async fn oauth_callback(&self, code: &str, state: &str) -> Result<OAuthLogin, AuthError> {
        let state = validate_state_token(&self.codec, state, self.provider.name())?;
        let public_host = self.public_host()?;
        if state.request_host != public_host {
            warn!(
                expected = %public_host,
                actual = %state.request_host,
                "oauth state was issued for another host"
            );
            return Err(AuthError::InvalidState);
        }

        let access_token = self.provider.exchange_code(code).await?;
        let profile = self.provider.fetch_profile(&access_token).await?;
        let user = self.resolve_provider_user(&profile).await?;
        let tokens = self.start_session(&user).await?;

        Ok(OAuthLogin {
            tokens,
            user_id: user.id,
            request_host: state.request_host,
        })
    }

    /// Email an activation link to a not yet activated account.
    ///
    /// # Errors
    /// `UserNotFound`, `AlreadyActivated`, or `CannotSendEmail`.
    pub async fn send_activation_email(&self, user_id: i64) -> Result<(), AuthError> {
        let user = self
            .users
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if user.is_activated {
            return Err(AuthError::AlreadyActivated);
        }
        let email = user
            .email
            .as_deref()
            .ok_or_else(|| AuthError::Validation("account has no email address".to_string()))?;

        let secret = self.one_time.issue(user.id, TokenPurpose::Activation).await?;
        let link = build_callback_url(self.config.activation_callback_url(), user.id, &secret)?;
        self.mailer
            .send(&activation_email(email, &link))
            .await
            .map_err(AuthError::CannotSendEmail)?;

        info!(user_id, "activation email sent");
        Ok(())
    }

    /// Activate an account with the secret from its activation email.
    ///
    /// # Errors
    /// `OneTimeToken` for a missing, wrong or expired secret, `AlreadyActivated`.
    pub async fn activate_account(&self, user_id: i64, token: &str) -> Result<(), AuthError> {
        let record = self
            .one_time
            .verify(user_id, token, TokenPurpose::Activation)
            .await?;
        let user = self
            .users
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if user.is_activated {
            return Err(AuthError::AlreadyActivated);
        }

        self.one_time.consume(&record).await?;
        self.users.set_activated(user_id).await?;
        info!(user_id, "account activated");
        Ok(())
    }

    /// Email a password reset link. Unknown emails succeed silently.
    ///
    /// # Errors
    /// `Validation` for a malformed email, `CannotSendEmail`.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(AuthError::Validation("invalid email address".to_string()));
        }

        let Some(user) = self.users.find_user_by_email(&email).await? else {
            debug!("password reset requested for unknown email");
            return Ok(());
        };

        let secret = self
            .one_time
            .issue(user.id, TokenPurpose::PasswordReset)
            .await?;
        let link =
            build_callback_url(self.config.password_reset_callback_url(), user.id, &secret)?;
        self.mailer
            .send(&password_reset_email(&email, &link))
            .await
            .map_err(AuthError::CannotSendEmail)?;

        info!(user_id = user.id, "password reset email sent");
        Ok(())
    }

    /// Check a password reset secret without using it.
    ///
    /// # Errors
    /// `OneTimeToken` for a missing, wrong or expired secret.
    pub async fn verify_password_reset(&self, user_id: i64, token: &str) -> Result<(), AuthError> {
        self.one_time
            .verify(user_id, token, TokenPurpose::PasswordReset)
            .await?;
        Ok(())
    }

    /// Consume a password reset secret and set a new password.
    ///
    /// # Errors
    /// `Validation` for a malformed password, `OneTimeToken` for a bad secret.
    pub async fn reset_password(
        &self,
        user_id: i64,
        token: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if !valid_password(new_password) {
            return Err(AuthError::Validation(
                "password must be 6 to 30 printable characters without spaces".to_string(),
            ));
        }

        let record = self
            .one_time
            .verify(user_id, token, TokenPurpose::PasswordReset)
            .await?;
        let password_hash = self.hash_password(new_password).await?;
        // Claim the secret before writing; a concurrent reset with the same secret
        // loses here and changes nothing.
        self.one_time.consume(&record).await?;
        if self.users.update_password(user_id, &password_hash).await? == 0 {
            return Err(AuthError::UserNotFound);
        }

        info!(user_id, "password reset");
        Ok(())
    }

    fn public_host(&self) -> Result<String, AuthError> {
        self.config.public_host().ok_or_else(|| {
            AuthError::Internal(anyhow!(
                "public URL has no host: {}",
                self.config.public_url()
            ))
        })
    }

    fn verify_kind(&self, token: &str, kind: TokenKind) -> Result<Claims<AuthInfo>, AuthError> {
        let claims = self.codec.verify::<AuthInfo>(token)?;
        if claims.payload.typ != kind {
            return Err(AuthError::InvalidToken(TokenError::Malformed));
        }
        Ok(claims)
    }

    async fn start_session(&self, user: &User) -> Result<TokenPair, AuthError> {
        let pair = self.issue_token_pair(user).await?;
        self.sessions
            .create(
                user.id,
                &pair.refresh_token.value,
                pair.refresh_token.claims.expires_at(),
            )
            .await?;
        Ok(pair)
    }

    /// Sign access and refresh tokens on two blocking tasks and join them.
    async fn issue_token_pair(&self, user: &User) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        let access = AuthInfo::new(user, TokenKind::Access);
        let refresh = AuthInfo::new(user, TokenKind::Refresh);
        let access_expires_at = now + self.config.access_token_ttl();
        let refresh_expires_at = now + self.config.refresh_token_ttl();

        let access_codec = Arc::clone(&self.codec);
        let refresh_codec = Arc::clone(&self.codec);
        let (access_token, refresh_token) = tokio::try_join!(
            tokio::task::spawn_blocking(move || access_codec.sign(access, access_expires_at)),
            tokio::task::spawn_blocking(move || refresh_codec.sign(refresh, refresh_expires_at)),
        )
        .context("token signing task failed")?;

        Ok(TokenPair {
            access_token: access_token.map_err(token_failure)?,
            refresh_token: refresh_token.map_err(token_failure)?,
        })
    }

    async fn resolve_provider_user(&self, profile: &ProviderProfile) -> Result<User, AuthError> {
        let email = match profile.email.as_deref() {
            Some(email) if profile.email_verified => normalize_email(email),
            _ => return Err(AuthError::InvalidAccount),
        };
        let provider_id = profile.provider_user_id.as_str();

        if let Some(user) = self.users.find_user_by_google_id(provider_id).await? {
            return Ok(user);
        }

        if let Some(user) = self.users.link_google_id(&email, provider_id).await? {
            info!(user_id = user.id, "provider identity linked to existing account");
            return Ok(user);
        }

        match self.users.create_google_user(&email, provider_id).await? {
            CreateUserOutcome::Created(user) => {
                info!(user_id = user.id, "user registered through provider");
                Ok(user)
            }
            // Either a concurrent callback created the account first, or the email
            // belongs to an account linked to a different provider identity.
            CreateUserOutcome::Conflict => self
                .users
                .find_user_by_google_id(provider_id)
                .await?
                .ok_or(AuthError::InvalidAccount),
        }
    }

    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let credentials = self.credentials.clone();
        let password = password.to_string();
        let hash = tokio::task::spawn_blocking(move || credentials.hash_password(&password))
            .await
            .context("password hashing task failed")??;
        Ok(hash)
    }

    /// Spend one password verification on a fixed hash; the result is always a miss.
    async fn verify_dummy_password(&self, password: &str) -> Result<(), AuthError> {
        let credentials = self.credentials.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || credentials.verify_dummy_password(&password))
            .await
            .context("password verification task failed")?;
        Ok(())
    }

    async fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let credentials = self.credentials.clone();
        let password = password.to_string();
        let hash = hash.to_string();
        let matches =
            tokio::task::spawn_blocking(move || credentials.verify_password(&password, &hash))
                .await
                .context("password verification task failed")?;
        Ok(matches)
    }
}

fn token_failure(err: TokenError) -> AuthError {
    AuthError::Internal(anyhow!(err).context("failed to produce token"))
}

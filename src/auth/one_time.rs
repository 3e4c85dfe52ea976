//! Purpose-scoped, expiring, single-use secrets (activation, password reset).
//!
//! Issuing replaces any live token for the same `(user, purpose)`. Verification does
//! not consume. Callers claim the verified row with [`OneTimeTokenService::consume`]
//! before running the guarded action, so of two requests racing on one secret only
//! the one whose delete matched goes on to act.

use chrono::{Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::credentials::{CredentialStore, SECRET_BYTES, generate_secret};
use crate::store::{OneTimeTokenRecord, OneTimeTokenStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenPurpose {
    Activation,
    PasswordReset,
}

impl TokenPurpose {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Activation => "activation",
            Self::PasswordReset => "password_reset",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "activation" => Some(Self::Activation),
            "password_reset" => Some(Self::PasswordReset),
            _ => None,
        }
    }

    /// 24 hours for activation, 1 hour for password reset.
    #[must_use]
    pub const fn default_ttl_seconds(self) -> i64 {
        match self {
            Self::Activation => 24 * 60 * 60,
            Self::PasswordReset => 60 * 60,
        }
    }
}

#[derive(Debug, Error)]
pub enum OneTimeTokenError {
    #[error("token not found")]
    NotFound,

    #[error("invalid token")]
    Invalid,

    #[error("token expired")]
    Expired,

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Clone)]
pub struct OneTimeTokenService {
    store: Arc<dyn OneTimeTokenStore>,
    credentials: CredentialStore,
    activation_ttl: Duration,
    password_reset_ttl: Duration,
}

impl OneTimeTokenService {
    #[must_use]
    pub fn new(store: Arc<dyn OneTimeTokenStore>, credentials: CredentialStore) -> Self {
        Self {
            store,
            credentials,
            activation_ttl: Duration::seconds(TokenPurpose::Activation.default_ttl_seconds()),
            password_reset_ttl: Duration::seconds(
                TokenPurpose::PasswordReset.default_ttl_seconds(),
            ),
        }
    }

    #[must_use]
    pub fn with_ttl_seconds(mut self, purpose: TokenPurpose, seconds: i64) -> Self {
        match purpose {
            TokenPurpose::Activation => self.activation_ttl = Duration::seconds(seconds),
            TokenPurpose::PasswordReset => self.password_reset_ttl = Duration::seconds(seconds),
        }
        self
    }

    #[must_use]
    pub fn ttl(&self, purpose: TokenPurpose) -> Duration {
        match purpose {
            TokenPurpose::Activation => self.activation_ttl,
            TokenPurpose::PasswordReset => self.password_reset_ttl,
        }
    }

    /// Issue a fresh secret for `(user_id, purpose)`, superseding any previous one.
    /// The plaintext is returned for out-of-band delivery and never stored.
    ///
    /// # Errors
    /// Returns `Store` if the RNG or the store fails.
    pub async fn issue(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
    ) -> Result<String, OneTimeTokenError> {
        let secret = generate_secret(SECRET_BYTES)?;
        let token_hash = self.credentials.hash_secret(&secret)?;
        let expires_at = Utc::now() + self.ttl(purpose);

        self.store
            .upsert_token(user_id, purpose, &token_hash, expires_at)
            .await?;
        debug!(user_id, purpose = purpose.as_str(), "one-time token issued");
        Ok(secret)
    }

    /// Check `secret` for `(user_id, purpose)`: presence, then hash, then expiry.
    ///
    /// # Errors
    /// `NotFound`, `Invalid` or `Expired`; `Store` on storage failure.
    pub async fn verify(
        &self,
        user_id: i64,
        secret: &str,
        purpose: TokenPurpose,
    ) -> Result<OneTimeTokenRecord, OneTimeTokenError> {
        let record = self
            .store
            .find_token(user_id, purpose)
            .await?
            .ok_or(OneTimeTokenError::NotFound)?;

        if !self.credentials.verify_secret(secret, &record.token_hash) {
            return Err(OneTimeTokenError::Invalid);
        }
        if record.expires_at < Utc::now() {
            return Err(OneTimeTokenError::Expired);
        }
        Ok(record)
    }

    /// Delete a verified token row, as long as it still holds the verified hash.
    ///
    /// # Errors
    /// `NotFound` if the row is gone or was reissued since `record` was read;
    /// `Store` on storage failure.
    pub async fn consume(&self, record: &OneTimeTokenRecord) -> Result<(), OneTimeTokenError> {
        match self
            .store
            .delete_token(record.id, &record.token_hash)
            .await?
        {
            0 => Err(OneTimeTokenError::NotFound),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use anyhow::Result;
    use secrecy::SecretString;

    fn service(store: Arc<MemoryStore>) -> OneTimeTokenService {
        OneTimeTokenService::new(
            store,
            CredentialStore::new(SecretString::from("one-time-secret-key-for-tests-00")),
        )
    }

    #[test]
    fn purpose_names_round_trip() {
        for purpose in [TokenPurpose::Activation, TokenPurpose::PasswordReset] {
            assert_eq!(TokenPurpose::parse(purpose.as_str()), Some(purpose));
        }
        assert_eq!(TokenPurpose::parse("login"), None);
    }

    #[tokio::test]
    async fn issue_stores_hash_not_secret() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let service = service(store.clone());

        let secret = service.issue(42, TokenPurpose::PasswordReset).await?;
        assert_eq!(secret.len(), SECRET_BYTES * 2);

        let record = store.find_token(42, TokenPurpose::PasswordReset).await?;
        let Some(record) = record else {
            anyhow::bail!("expected token row");
        };
        assert_ne!(record.token_hash, secret);
        Ok(())
    }

    #[tokio::test]
    async fn verify_then_consume() -> Result<()> {
        let service = service(Arc::new(MemoryStore::new()));
        let secret = service.issue(42, TokenPurpose::PasswordReset).await?;

        let record = service
            .verify(42, &secret, TokenPurpose::PasswordReset)
            .await?;
        service.consume(&record).await?;

        let again = service
            .verify(42, &secret, TokenPurpose::PasswordReset)
            .await;
        assert!(matches!(again, Err(OneTimeTokenError::NotFound)));
        Ok(())
    }

    #[tokio::test]
    async fn verify_rejects_wrong_secret_and_purpose() -> Result<()> {
        let service = service(Arc::new(MemoryStore::new()));
        let secret = service.issue(42, TokenPurpose::Activation).await?;

        let wrong = service
            .verify(42, "deadbeef", TokenPurpose::Activation)
            .await;
        assert!(matches!(wrong, Err(OneTimeTokenError::Invalid)));

        let other_purpose = service
            .verify(42, &secret, TokenPurpose::PasswordReset)
            .await;
        assert!(matches!(other_purpose, Err(OneTimeTokenError::NotFound)));

        let other_user = service.verify(43, &secret, TokenPurpose::Activation).await;
        assert!(matches!(other_user, Err(OneTimeTokenError::NotFound)));
        Ok(())
    }

    #[tokio::test]
    async fn verify_rejects_expired_token() -> Result<()> {
        let service = service(Arc::new(MemoryStore::new()))
            .with_ttl_seconds(TokenPurpose::PasswordReset, -1);
        let secret = service.issue(42, TokenPurpose::PasswordReset).await?;

        let result = service
            .verify(42, &secret, TokenPurpose::PasswordReset)
            .await;
        assert!(matches!(result, Err(OneTimeTokenError::Expired)));
        Ok(())
    }

    #[tokio::test]
    async fn reissue_supersedes_previous_secret() -> Result<()> {
        let service = service(Arc::new(MemoryStore::new()));
        let first = service.issue(42, TokenPurpose::PasswordReset).await?;
        let second = service.issue(42, TokenPurpose::PasswordReset).await?;

        let stale = service
            .verify(42, &first, TokenPurpose::PasswordReset)
            .await;
        assert!(matches!(stale, Err(OneTimeTokenError::Invalid)));
        service
            .verify(42, &second, TokenPurpose::PasswordReset)
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn consume_succeeds_once() -> Result<()> {
        let service = service(Arc::new(MemoryStore::new()));
        let secret = service.issue(42, TokenPurpose::PasswordReset).await?;
        let record = service
            .verify(42, &secret, TokenPurpose::PasswordReset)
            .await?;

        service.consume(&record).await?;
        assert!(matches!(
            service.consume(&record).await,
            Err(OneTimeTokenError::NotFound)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn consume_with_superseded_record_keeps_newer_secret() -> Result<()> {
        let service = service(Arc::new(MemoryStore::new()));
        let first = service.issue(42, TokenPurpose::PasswordReset).await?;
        let stale = service
            .verify(42, &first, TokenPurpose::PasswordReset)
            .await?;
        let second = service.issue(42, TokenPurpose::PasswordReset).await?;

        assert!(matches!(
            service.consume(&stale).await,
            Err(OneTimeTokenError::NotFound)
        ));
        service
            .verify(42, &second, TokenPurpose::PasswordReset)
            .await?;
        Ok(())
    }
}

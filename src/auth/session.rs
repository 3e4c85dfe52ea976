//! Session ledger: the record of which refresh token is currently live per session.
//!
//! Rotation is a compare-and-swap on the exact refresh token value. When nothing
//! matches, the presented token was either rotated away already or never issued,
//! and the caller gets [`LedgerError::ReuseOrUnknownToken`].

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use crate::store::{Session, SessionStore};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("refresh token reused or unknown")]
    ReuseOrUnknownToken,

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Clone)]
pub struct SessionLedger {
    store: Arc<dyn SessionStore>,
}

impl SessionLedger {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Record a newly issued refresh token.
    ///
    /// # Errors
    /// Returns `Store` on storage failure.
    pub async fn create(
        &self,
        user_id: i64,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        self.store
            .insert_session(user_id, refresh_token, expires_at)
            .await?;
        Ok(())
    }

    /// Replace `old_refresh_token` with `new_refresh_token`.
    ///
    /// # Errors
    /// `ReuseOrUnknownToken` if `old_refresh_token` is not the live token for
    /// `user_id`; `Store` on storage failure.
    pub async fn rotate(
        &self,
        user_id: i64,
        old_refresh_token: &str,
        new_refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let updated = self
            .store
            .replace_session(user_id, old_refresh_token, new_refresh_token, expires_at)
            .await?;
        if updated == 0 {
            return Err(LedgerError::ReuseOrUnknownToken);
        }
        Ok(())
    }

    /// Read-only check that `refresh_token` is live for `user_id`.
    ///
    /// # Errors
    /// `ReuseOrUnknownToken` if no session matches; `Store` on storage failure.
    pub async fn verify(&self, user_id: i64, refresh_token: &str) -> Result<Session, LedgerError> {
        self.store
            .find_session(user_id, refresh_token)
            .await?
            .ok_or(LedgerError::ReuseOrUnknownToken)
    }

    /// Delete the session holding `refresh_token`.
    ///
    /// # Errors
    /// `ReuseOrUnknownToken` if nothing was deleted; `Store` on storage failure.
    pub async fn revoke(&self, user_id: i64, refresh_token: &str) -> Result<(), LedgerError> {
        match self.store.delete_session(user_id, refresh_token).await? {
            0 => Err(LedgerError::ReuseOrUnknownToken),
            _ => Ok(()),
        }
    }
}

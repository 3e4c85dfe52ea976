//! Error taxonomy of the auth flows.
//!
//! Business-rule failures are typed variants. Storage and other infrastructure
//! failures are carried opaquely in `Internal`.

use thiserror::Error;

use super::oauth::{ProviderError, StateError};
use super::one_time::OneTimeTokenError;
use super::session::LedgerError;
use super::token::TokenError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("email already registered")]
    DuplicateEmail,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid token: {0}")]
    InvalidToken(#[from] TokenError),

    /// The refresh token is well formed but is not the live token of any session.
    #[error("refresh token reused or unknown")]
    ReusedToken,

    #[error("user not found")]
    UserNotFound,

    #[error("user already activated")]
    AlreadyActivated,

    /// `NotFound`, `Invalid` or `Expired`; never `Store`.
    #[error("one-time token rejected: {0}")]
    OneTimeToken(OneTimeTokenError),

    #[error("invalid state token")]
    InvalidState,

    #[error("state token issued for another provider")]
    MismatchedProvider,

    #[error("provider account cannot be used")]
    InvalidAccount,

    #[error("cannot send email")]
    CannotSendEmail(#[source] anyhow::Error),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            Self::CannotSendEmail(_) | Self::Provider(_) | Self::Internal(_)
        )
    }
}

impl From<LedgerError> for AuthError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::ReuseOrUnknownToken => Self::ReusedToken,
            LedgerError::Store(err) => Self::Internal(err),
        }
    }
}

impl From<OneTimeTokenError> for AuthError {
    fn from(err: OneTimeTokenError) -> Self {
        match err {
            OneTimeTokenError::Store(err) => Self::Internal(err),
            other => Self::OneTimeToken(other),
        }
    }
}

impl From<StateError> for AuthError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::Invalid(_) => Self::InvalidState,
            StateError::MismatchedProvider => Self::MismatchedProvider,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn ledger_errors_split_reuse_from_storage() {
        assert!(matches!(
            AuthError::from(LedgerError::ReuseOrUnknownToken),
            AuthError::ReusedToken
        ));
        assert!(matches!(
            AuthError::from(LedgerError::Store(anyhow!("db down"))),
            AuthError::Internal(_)
        ));
    }

    #[test]
    fn one_time_storage_errors_become_internal() {
        assert!(matches!(
            AuthError::from(OneTimeTokenError::Expired),
            AuthError::OneTimeToken(OneTimeTokenError::Expired)
        ));
        assert!(matches!(
            AuthError::from(OneTimeTokenError::Store(anyhow!("db down"))),
            AuthError::Internal(_)
        ));
    }

    #[test]
    fn state_errors_map_to_flow_errors() {
        assert!(matches!(
            AuthError::from(StateError::Invalid(TokenError::Malformed)),
            AuthError::InvalidState
        ));
        assert!(matches!(
            AuthError::from(StateError::MismatchedProvider),
            AuthError::MismatchedProvider
        ));
    }

    #[test]
    fn infrastructure_errors_are_not_client_errors() {
        assert!(AuthError::DuplicateEmail.is_client_error());
        assert!(AuthError::ReusedToken.is_client_error());
        assert!(!AuthError::Internal(anyhow!("boom")).is_client_error());
        assert!(!AuthError::Provider(ProviderError::Timeout).is_client_error());
    }
}

//! Persistence for users, sessions and one-time tokens.
//!
//! The auth core only talks to these traits. `PgStore` is the production backend;
//! `MemoryStore` keeps the same conditional-update semantics in process.
//!
//! Conditional writes report the number of affected rows. Callers use a zero count
//! to detect "no match" (for example a refresh token that was already rotated).

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::auth::TokenPurpose;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Account record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub is_activated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One outstanding refresh-token grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Stored one-time token; only the secret's hash is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneTimeTokenRecord {
    pub id: i64,
    pub user_id: i64,
    pub purpose: TokenPurpose,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of inserting a user with unique columns.
#[derive(Debug)]
pub enum CreateUserOutcome {
    Created(User),
    Conflict,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a password account. `Conflict` when the email is taken.
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<CreateUserOutcome>;

    /// Insert an account federated with Google. The email is provider-verified, so
    /// the account starts activated. `Conflict` when email or Google id is taken.
    async fn create_google_user(&self, email: &str, google_id: &str) -> Result<CreateUserOutcome>;

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_user_by_google_id(&self, google_id: &str) -> Result<Option<User>>;

    /// Attach `google_id` to the account owning `email`, if it has no Google id yet.
    ///
    /// An account that was never activated gets its password removed, since the
    /// password was set by someone who had not proven ownership of the email.
    async fn link_google_id(&self, email: &str, google_id: &str) -> Result<Option<User>>;

    async fn set_activated(&self, user_id: i64) -> Result<u64>;

    async fn update_password(&self, user_id: i64, password_hash: &str) -> Result<u64>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Record a new session. Expired sessions of the same user are dropped first.
    async fn insert_session(
        &self,
        user_id: i64,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Swap `old_refresh_token` for `new_refresh_token` on the row owned by `user_id`.
    /// Must be atomic: concurrent calls with the same old token update at most once.
    async fn replace_session(
        &self,
        user_id: i64,
        old_refresh_token: &str,
        new_refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<u64>;

    async fn find_session(&self, user_id: i64, refresh_token: &str) -> Result<Option<Session>>;

    async fn delete_session(&self, user_id: i64, refresh_token: &str) -> Result<u64>;
}

#[async_trait]
pub trait OneTimeTokenStore: Send + Sync {
    /// Insert or replace the token for `(user_id, purpose)`.
    async fn upsert_token(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn find_token(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
    ) -> Result<Option<OneTimeTokenRecord>>;

    /// Delete the row only while it still holds `token_hash`. A row that was
    /// reissued (same id, new hash) or already deleted matches nothing.
    async fn delete_token(&self, token_id: i64, token_hash: &str) -> Result<u64>;
}

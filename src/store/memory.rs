//! In-process backend used by tests and local runs without Postgres.
//!
//! Every operation takes one lock over the whole state, which gives the same
//! row-level atomicity the Postgres backend relies on.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use super::{
    CreateUserOutcome, OneTimeTokenRecord, OneTimeTokenStore, Session, SessionStore, User,
    UserStore,
};
use crate::auth::TokenPurpose;

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    users: BTreeMap<i64, User>,
    // keyed by refresh token value (unique)
    sessions: HashMap<String, Session>,
    tokens: HashMap<(i64, TokenPurpose), OneTimeTokenRecord>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn email_taken(&self, email: &str) -> bool {
        self.users
            .values()
            .any(|user| user.email.as_deref() == Some(email))
    }

    fn google_id_taken(&self, google_id: &str) -> bool {
        self.users
            .values()
            .any(|user| user.google_id.as_deref() == Some(google_id))
    }

    fn insert_user(
        &mut self,
        email: &str,
        password_hash: Option<&str>,
        google_id: Option<&str>,
    ) -> User {
        let now = Utc::now();
        let user = User {
            id: self.next_id(),
            email: Some(email.to_string()),
            password_hash: password_hash.map(str::to_string),
            google_id: google_id.map(str::to_string),
            is_activated: google_id.is_some(),
            created_at: now,
            updated_at: now,
        };
        self.users.insert(user.id, user.clone());
        user
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live session rows.
    pub async fn session_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<CreateUserOutcome> {
        let mut state = self.state.lock().await;
        if state.email_taken(email) {
            return Ok(CreateUserOutcome::Conflict);
        }
        Ok(CreateUserOutcome::Created(state.insert_user(
            email,
            Some(password_hash),
            None,
        )))
    }

    async fn create_google_user(&self, email: &str, google_id: &str) -> Result<CreateUserOutcome> {
        let mut state = self.state.lock().await;
        if state.email_taken(email) || state.google_id_taken(google_id) {
            return Ok(CreateUserOutcome::Conflict);
        }
        Ok(CreateUserOutcome::Created(state.insert_user(
            email,
            None,
            Some(google_id),
        )))
    }

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|user| user.email.as_deref() == Some(email))
            .cloned())
    }

    async fn find_user_by_google_id(&self, google_id: &str) -> Result<Option<User>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|user| user.google_id.as_deref() == Some(google_id))
            .cloned())
    }

    async fn link_google_id(&self, email: &str, google_id: &str) -> Result<Option<User>> {
        let mut state = self.state.lock().await;
        if state.google_id_taken(google_id) {
            return Ok(None);
        }
        let Some(user) = state
            .users
            .values_mut()
            .find(|user| user.email.as_deref() == Some(email) && user.google_id.is_none())
        else {
            return Ok(None);
        };

        if !user.is_activated {
            user.password_hash = None;
        }
        user.google_id = Some(google_id.to_string());
        user.is_activated = true;
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn set_activated(&self, user_id: i64) -> Result<u64> {
        let mut state = self.state.lock().await;
        Ok(state.users.get_mut(&user_id).map_or(0, |user| {
            user.is_activated = true;
            user.updated_at = Utc::now();
            1
        }))
    }

    async fn update_password(&self, user_id: i64, password_hash: &str) -> Result<u64> {
        let mut state = self.state.lock().await;
        Ok(state.users.get_mut(&user_id).map_or(0, |user| {
            user.password_hash = Some(password_hash.to_string());
            user.updated_at = Utc::now();
            1
        }))
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(
        &self,
        user_id: i64,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        state
            .sessions
            .retain(|_, session| session.user_id != user_id || session.expires_at >= now);
        let session = Session {
            id: state.next_id(),
            user_id,
            refresh_token: refresh_token.to_string(),
            expires_at,
            created_at: Utc::now(),
        };
        state.sessions.insert(refresh_token.to_string(), session);
        Ok(())
    }

    async fn replace_session(
        &self,
        user_id: i64,
        old_refresh_token: &str,
        new_refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<u64> {
        let mut state = self.state.lock().await;
        let owned = state
            .sessions
            .get(old_refresh_token)
            .is_some_and(|session| session.user_id == user_id);
        if !owned {
            return Ok(0);
        }
        let Some(mut session) = state.sessions.remove(old_refresh_token) else {
            return Ok(0);
        };
        session.refresh_token = new_refresh_token.to_string();
        session.expires_at = expires_at;
        state
            .sessions
            .insert(new_refresh_token.to_string(), session);
        Ok(1)
    }

    async fn find_session(&self, user_id: i64, refresh_token: &str) -> Result<Option<Session>> {
        let state = self.state.lock().await;
        Ok(state
            .sessions
            .get(refresh_token)
            .filter(|session| session.user_id == user_id)
            .cloned())
    }

    async fn delete_session(&self, user_id: i64, refresh_token: &str) -> Result<u64> {
        let mut state = self.state.lock().await;
        let owned = state
            .sessions
            .get(refresh_token)
            .is_some_and(|session| session.user_id == user_id);
        if owned {
            state.sessions.remove(refresh_token);
            Ok(1)
        } else {
            Ok(0)
        }
    }
}

#[async_trait]
impl OneTimeTokenStore for MemoryStore {
    async fn upsert_token(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let id = match state.tokens.get(&(user_id, purpose)) {
            Some(existing) => existing.id,
            None => state.next_id(),
        };
        state.tokens.insert(
            (user_id, purpose),
            OneTimeTokenRecord {
                id,
                user_id,
                purpose,
                token_hash: token_hash.to_string(),
                expires_at,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn find_token(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
    ) -> Result<Option<OneTimeTokenRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .tokens
            .get(&(user_id, purpose))
            .cloned())
    }

    async fn delete_token(&self, token_id: i64, token_hash: &str) -> Result<u64> {
        let mut state = self.state.lock().await;
        let before = state.tokens.len();
        state
            .tokens
            .retain(|_, record| record.id != token_id || record.token_hash != token_hash);
        Ok((before - state.tokens.len()) as u64)
    }
}

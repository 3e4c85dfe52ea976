//! Postgres backend (see `sql/schema.sql`).

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::{Instrument, debug};

use super::{
    CreateUserOutcome, OneTimeTokenRecord, OneTimeTokenStore, Session, SessionStore, User,
    UserStore,
};
use crate::auth::TokenPurpose;

const USER_COLUMNS: &str =
    "id, email, password_hash, google_id, is_activated, created_at, updated_at";

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_span(operation: &'static str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        google_id: row.get("google_id"),
        is_activated: row.get("is_activated"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn token_from_row(row: &PgRow) -> Result<OneTimeTokenRecord> {
    let purpose: String = row.get("purpose");
    Ok(OneTimeTokenRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        purpose: TokenPurpose::parse(&purpose)
            .ok_or_else(|| anyhow!("unknown token purpose in database: {purpose}"))?,
        token_hash: row.get("token_hash"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    })
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

impl PgStore {
    async fn insert_user(
        &self,
        query: &str,
        first: &str,
        second: &str,
        context: &'static str,
    ) -> Result<CreateUserOutcome> {
        let row = sqlx::query(query)
            .bind(first)
            .bind(second)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", query))
            .await;

        match row {
            Ok(row) => Ok(CreateUserOutcome::Created(user_from_row(&row))),
            Err(err) if is_unique_violation(&err) => Ok(CreateUserOutcome::Conflict),
            Err(err) => Err(err).context(context),
        }
    }

    async fn find_user(&self, query: &str, value: &str) -> Result<Option<User>> {
        let row = sqlx::query(query)
            .bind(value)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup user")?;
        Ok(row.as_ref().map(user_from_row))
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<CreateUserOutcome> {
        let query = format!(
            "INSERT INTO users (email, password_hash) VALUES ($1, $2) RETURNING {USER_COLUMNS}"
        );
        self.insert_user(&query, email, password_hash, "failed to insert user")
            .await
    }

    async fn create_google_user(&self, email: &str, google_id: &str) -> Result<CreateUserOutcome> {
        let query = format!(
            "INSERT INTO users (email, google_id, is_activated) VALUES ($1, $2, TRUE) RETURNING {USER_COLUMNS}"
        );
        self.insert_user(&query, email, google_id, "failed to insert google user")
            .await
    }

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to lookup user by id")?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        self.find_user(&query, email).await
    }

    async fn find_user_by_google_id(&self, google_id: &str) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE google_id = $1");
        self.find_user(&query, google_id).await
    }

    async fn link_google_id(&self, email: &str, google_id: &str) -> Result<Option<User>> {
        let query = format!(
            r"
            UPDATE users
            SET google_id = $2,
                password_hash = CASE WHEN is_activated THEN password_hash ELSE NULL END,
                is_activated = TRUE,
                updated_at = NOW()
            WHERE email = $1 AND google_id IS NULL
            RETURNING {USER_COLUMNS}
        "
        );
        let row = sqlx::query(&query)
            .bind(email)
            .bind(google_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", &query))
            .await;

        match row {
            Ok(row) => Ok(row.as_ref().map(user_from_row)),
            // Another account already owns this Google id.
            Err(err) if is_unique_violation(&err) => Ok(None),
            Err(err) => Err(err).context("failed to link google account"),
        }
    }

    async fn set_activated(&self, user_id: i64) -> Result<u64> {
        let query = "UPDATE users SET is_activated = TRUE, updated_at = NOW() WHERE id = $1";
        let result = sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to activate user")?;
        Ok(result.rows_affected())
    }

    async fn update_password(&self, user_id: i64, password_hash: &str) -> Result<u64> {
        let query = "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1";
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to update password")?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn insert_session(
        &self,
        user_id: i64,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        // Sessions whose refresh token has expired can never rotate again.
        let prune = "DELETE FROM user_sessions WHERE user_id = $1 AND expires_at < NOW()";
        let pruned = sqlx::query(prune)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(db_span("DELETE", prune))
            .await
            .context("failed to prune expired sessions")?;
        if pruned.rows_affected() > 0 {
            debug!(user_id, pruned = pruned.rows_affected(), "expired sessions pruned");
        }

        let query = r"
            INSERT INTO user_sessions
                (user_id, refresh_token, expires_at)
            VALUES ($1, $2, $3)
        ";
        sqlx::query(query)
            .bind(user_id)
            .bind(refresh_token)
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .context("failed to insert session")?;
        Ok(())
    }

    async fn replace_session(
        &self,
        user_id: i64,
        old_refresh_token: &str,
        new_refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<u64> {
        // refresh_token is UNIQUE, so this touches at most one row. A concurrent
        // update on the same row re-checks the WHERE clause after the row lock and
        // finds the token already replaced.
        let query = r"
            UPDATE user_sessions
            SET refresh_token = $3, expires_at = $4
            WHERE user_id = $1 AND refresh_token = $2
        ";
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(old_refresh_token)
            .bind(new_refresh_token)
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to rotate session")?;
        Ok(result.rows_affected())
    }

    async fn find_session(&self, user_id: i64, refresh_token: &str) -> Result<Option<Session>> {
        let query = r"
            SELECT id, user_id, refresh_token, expires_at, created_at
            FROM user_sessions
            WHERE user_id = $1 AND refresh_token = $2
        ";
        let row = sqlx::query(query)
            .bind(user_id)
            .bind(refresh_token)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup session")?;

        Ok(row.map(|row| Session {
            id: row.get("id"),
            user_id: row.get("user_id"),
            refresh_token: row.get("refresh_token"),
            expires_at: row.get("expires_at"),
            created_at: row.get("created_at"),
        }))
    }

    async fn delete_session(&self, user_id: i64, refresh_token: &str) -> Result<u64> {
        let query = "DELETE FROM user_sessions WHERE user_id = $1 AND refresh_token = $2";
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(refresh_token)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to delete session")?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl OneTimeTokenStore for PgStore {
    async fn upsert_token(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let query = r"
            INSERT INTO one_time_tokens
                (user_id, purpose, token_hash, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, purpose) DO UPDATE
            SET token_hash = EXCLUDED.token_hash,
                expires_at = EXCLUDED.expires_at,
                created_at = NOW()
        ";
        sqlx::query(query)
            .bind(user_id)
            .bind(purpose.as_str())
            .bind(token_hash)
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .context("failed to upsert one-time token")?;
        Ok(())
    }

    async fn find_token(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
    ) -> Result<Option<OneTimeTokenRecord>> {
        let query = r"
            SELECT id, user_id, purpose, token_hash, expires_at, created_at
            FROM one_time_tokens
            WHERE user_id = $1 AND purpose = $2
        ";
        let row = sqlx::query(query)
            .bind(user_id)
            .bind(purpose.as_str())
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup one-time token")?;
        row.as_ref().map(token_from_row).transpose()
    }

    async fn delete_token(&self, token_id: i64, token_hash: &str) -> Result<u64> {
        let query = "DELETE FROM one_time_tokens WHERE id = $1 AND token_hash = $2";
        let result = sqlx::query(query)
            .bind(token_id)
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to delete one-time token")?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test db error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test db error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    #[test]
    fn is_unique_violation_matches_23505() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));
    }

    #[test]
    fn is_unique_violation_ignores_other_errors() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23503"),
        }));
        assert!(!is_unique_violation(&err));
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn schema_declares_constraints_the_queries_rely_on() {
        let schema = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));
        assert!(schema.contains("refresh_token   TEXT NOT NULL UNIQUE"));
        assert!(schema.contains("UNIQUE (user_id, purpose)"));
        assert!(schema.contains("google_id       TEXT UNIQUE"));
    }

    #[tokio::test]
    async fn lazy_pool_does_not_connect_until_used() -> Result<()> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://postgres@localhost/studyplanner")?;
        let store = PgStore::new(pool);
        assert_eq!(store.pool().size(), 0);
        Ok(())
    }
}

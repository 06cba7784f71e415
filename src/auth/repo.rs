use crate::auth::error::AuthError;
use crate::auth::repo_types::{NewUser, User};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

impl User {
    /// Create a new user. The unique constraint on email is the authority on
    /// duplicates; code 23505 becomes `DuplicateEmail`.
    pub async fn create(db: &PgPool, new_user: &NewUser) -> Result<User, AuthError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash, full_name)
            VALUES ($1, $2, $3)
            RETURNING id, email, password_hash, full_name, is_active,
                      mfa_token, mfa_token_expires_at, created_at
            "#,
        )
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(&new_user.full_name)
        .fetch_one(db)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
                AuthError::DuplicateEmail
            }
            _ => AuthError::Persistence(e.into()),
        })?;
        Ok(user)
    }

    /// Find a user by email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, full_name, is_active,
                   mfa_token, mfa_token_expires_at, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Find a user whose pending code matches exactly.
    pub async fn find_by_email_and_token(
        db: &PgPool,
        email: &str,
        token: &str,
    ) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, full_name, is_active,
                   mfa_token, mfa_token_expires_at, created_at
            FROM users
            WHERE email = $1 AND mfa_token = $2
            "#,
        )
        .bind(email)
        .bind(token)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Overwrite the pending MFA pair in a single targeted update. Any
    /// still-pending code is superseded; unrelated columns are untouched.
    pub async fn set_mfa_token(
        db: &PgPool,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            UPDATE users
            SET mfa_token = $2, mfa_token_expires_at = $3
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Atomic verify-then-clear. Clears the pair only if the code still
    /// matches and has not expired; returns whether a row was consumed.
    /// Concurrent calls against the same code race here and exactly one wins.
    pub async fn consume_mfa_token(
        db: &PgPool,
        user_id: Uuid,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<bool, AuthError> {
        let consumed = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE users
            SET mfa_token = NULL, mfa_token_expires_at = NULL
            WHERE id = $1 AND mfa_token = $2 AND mfa_token_expires_at >= $3
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(now)
        .fetch_optional(db)
        .await?;
        Ok(consumed.is_some())
    }
}

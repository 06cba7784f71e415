use crate::auth::error::AuthError;
use crate::auth::repo_types::{NewUser, User};
use axum::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Mutex;
use time::OffsetDateTime;
use uuid::Uuid;

/// Durable user repository the auth engine runs against.
///
/// Implementations must give per-row atomicity: a unique-constraint-backed
/// create, single-statement writes of the MFA pair, and a conditional
/// consume so two concurrent verifications cannot both succeed.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn create_user(&self, new_user: &NewUser) -> Result<User, AuthError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError>;
    async fn find_by_email_and_token(
        &self,
        email: &str,
        token: &str,
    ) -> Result<Option<User>, AuthError>;
    async fn set_mfa_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), AuthError>;
    async fn consume_mfa_token(
        &self,
        user_id: Uuid,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<bool, AuthError>;
}

/// Postgres-backed store used in production.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn create_user(&self, new_user: &NewUser) -> Result<User, AuthError> {
        User::create(&self.db, new_user).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        User::find_by_email(&self.db, email).await
    }

    async fn find_by_email_and_token(
        &self,
        email: &str,
        token: &str,
    ) -> Result<Option<User>, AuthError> {
        User::find_by_email_and_token(&self.db, email, token).await
    }

    async fn set_mfa_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), AuthError> {
        User::set_mfa_token(&self.db, user_id, token, expires_at).await
    }

    async fn consume_mfa_token(
        &self,
        user_id: Uuid,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<bool, AuthError> {
        User::consume_mfa_token(&self.db, user_id, token, now).await
    }
}

/// In-memory store. Backs tests and `AppState::fake`.
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<String, User>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a stored row, for assertions.
    pub fn get(&self, email: &str) -> Option<User> {
        self.users
            .lock()
            .expect("store mutex poisoned")
            .get(email)
            .cloned()
    }

    pub fn deactivate(&self, email: &str) {
        if let Some(user) = self
            .users
            .lock()
            .expect("store mutex poisoned")
            .get_mut(email)
        {
            user.is_active = false;
        }
    }

    /// Rewrite a pending code's expiry, standing in for elapsed wall time.
    pub fn set_token_expiry(&self, email: &str, expires_at: OffsetDateTime) {
        if let Some(user) = self
            .users
            .lock()
            .expect("store mutex poisoned")
            .get_mut(email)
        {
            if user.mfa_token.is_some() {
                user.mfa_token_expires_at = Some(expires_at);
            }
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn create_user(&self, new_user: &NewUser) -> Result<User, AuthError> {
        let mut users = self.users.lock().expect("store mutex poisoned");
        if users.contains_key(&new_user.email) {
            return Err(AuthError::DuplicateEmail);
        }
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email.clone(),
            password_hash: new_user.password_hash.clone(),
            full_name: new_user.full_name.clone(),
            is_active: true,
            mfa_token: None,
            mfa_token_expires_at: None,
            created_at: OffsetDateTime::now_utc(),
        };
        users.insert(user.email.clone(), user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        Ok(self
            .users
            .lock()
            .expect("store mutex poisoned")
            .get(email)
            .cloned())
    }

    async fn find_by_email_and_token(
        &self,
        email: &str,
        token: &str,
    ) -> Result<Option<User>, AuthError> {
        Ok(self
            .users
            .lock()
            .expect("store mutex poisoned")
            .get(email)
            .filter(|u| u.mfa_token.as_deref() == Some(token))
            .cloned())
    }

    async fn set_mfa_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), AuthError> {
        let mut users = self.users.lock().expect("store mutex poisoned");
        if let Some(user) = users.values_mut().find(|u| u.id == user_id) {
            user.mfa_token = Some(token.to_string());
            user.mfa_token_expires_at = Some(expires_at);
        }
        Ok(())
    }

    async fn consume_mfa_token(
        &self,
        user_id: Uuid,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<bool, AuthError> {
        let mut users = self.users.lock().expect("store mutex poisoned");
        let Some(user) = users.values_mut().find(|u| u.id == user_id) else {
            return Ok(false);
        };
        let live = user.mfa_token.as_deref() == Some(token)
            && user.mfa_token_expires_at.is_some_and(|exp| exp >= now);
        if !live {
            return Ok(false);
        }
        user.mfa_token = None;
        user.mfa_token_expires_at = None;
        Ok(true)
    }
}

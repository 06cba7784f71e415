use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
///
/// `mfa_token` and `mfa_token_expires_at` are a pair: both present while a
/// code is pending, both absent otherwise. They are only ever written
/// together.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub full_name: Option<String>,
    pub is_active: bool,
    #[serde(skip_serializing)]
    pub mfa_token: Option<String>,
    #[serde(skip_serializing)]
    pub mfa_token_expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

/// Fields needed to create a user row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub full_name: Option<String>,
}

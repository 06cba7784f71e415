use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

/// Request body for login (first factor).
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for the second factor.
#[derive(Debug, Deserialize)]
pub struct VerifyMfaRequest {
    pub email: String,
    pub code: String,
}

/// Public part of the user returned to the client. The password hash and
/// MFA fields never leave the server.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
}

/// Response returned after registration.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: PublicUser,
    pub message: &'static str,
}

/// Acknowledgement body for login and MFA verification.
#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub message: &'static str,
}

pub const CODE_SENT: &str = "Verification code sent";
pub const CODE_ACCEPTED: &str = "Verification code accepted";

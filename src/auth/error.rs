use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

/// Failure modes of the authentication flows.
///
/// `UnknownUser` and `BadCredentials` are deliberately distinct (a product
/// decision carried over from the existing behavior). Notification failures
/// are not represented here: delivery problems are logged and never surfaced
/// to the caller.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Email already registered")]
    DuplicateEmail,
    #[error("No user registered with this email")]
    UnknownUser,
    #[error("Incorrect password")]
    BadCredentials,
    #[error("Account is inactive")]
    AccountInactive,
    #[error("Invalid or expired verification code")]
    InvalidOrExpiredToken,
    #[error("Invalid email")]
    InvalidEmail,
    #[error("Password too short")]
    WeakPassword,
    #[error(transparent)]
    Persistence(#[from] anyhow::Error),
}

impl From<sqlx::Error> for AuthError {
    fn from(e: sqlx::Error) -> Self {
        AuthError::Persistence(e.into())
    }
}

impl AuthError {
    fn status(&self) -> StatusCode {
        match self {
            AuthError::DuplicateEmail => StatusCode::CONFLICT,
            AuthError::UnknownUser | AuthError::BadCredentials | AuthError::AccountInactive => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::InvalidOrExpiredToken
            | AuthError::InvalidEmail
            | AuthError::WeakPassword => StatusCode::BAD_REQUEST,
            AuthError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            // Store faults keep their detail in the logs only.
            AuthError::Persistence(e) => {
                error!(error = %e, "persistence failure");
                "Internal error".to_string()
            }
            other => other.to_string(),
        };
        (status, body).into_response()
    }
}

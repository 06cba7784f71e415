use axum::{
    extract::{FromRef, State},
    routing::post,
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AckResponse, LoginRequest, PublicUser, RegisterRequest, RegisterResponse,
            VerifyMfaRequest, CODE_ACCEPTED, CODE_SENT,
        },
        error::AuthError,
        services::AuthService,
    },
    state::AppState,
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(AuthError::InvalidEmail);
    }
    Ok(email)
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/verify-mfa", post(verify_mfa))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, AuthError> {
    let email = normalize_email(&payload.email).inspect_err(|_| {
        warn!("register with invalid email");
    })?;

    if payload.password.len() < 8 {
        warn!(email = %email, "register with too short password");
        return Err(AuthError::WeakPassword);
    }

    let auth = AuthService::from_ref(&state);
    let user = auth
        .register(&email, &payload.password, payload.full_name)
        .await?;

    Ok(Json(RegisterResponse {
        user: PublicUser {
            id: user.id,
            email: user.email,
        },
        message: CODE_SENT,
    }))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AckResponse>, AuthError> {
    let email = normalize_email(&payload.email).inspect_err(|_| {
        warn!("login with invalid email");
    })?;

    let auth = AuthService::from_ref(&state);
    auth.login(&email, &payload.password).await?;

    Ok(Json(AckResponse { message: CODE_SENT }))
}

#[instrument(skip(state, payload))]
pub async fn verify_mfa(
    State(state): State<AppState>,
    Json(payload): Json<VerifyMfaRequest>,
) -> Result<Json<AckResponse>, AuthError> {
    let email = normalize_email(&payload.email).inspect_err(|_| {
        warn!("verify-mfa with invalid email");
    })?;

    let auth = AuthService::from_ref(&state);
    auth.verify_mfa(&email, payload.code.trim()).await?;

    info!(email = %email, "mfa verification succeeded");
    Ok(Json(AckResponse {
        message: CODE_ACCEPTED,
    }))
}

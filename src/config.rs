use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    pub api_key: String,
    pub sender_email: String,
    pub sender_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MfaConfig {
    pub token_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub notifier: NotifierConfig,
    pub mfa: MfaConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from a variable lookup. `from_env` wires in the
    /// process environment; tests pass a map instead of mutating env vars.
    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = get("DATABASE_URL").context("DATABASE_URL must be set")?;
        // A missing provider key must fail startup, not surface later as a silent send failure.
        let notifier = NotifierConfig {
            api_key: get("BREVO_API_KEY").context("BREVO_API_KEY must be set")?,
            sender_email: get("MFA_SENDER_EMAIL")
                .unwrap_or_else(|| "no-reply@mfagate.dev".into()),
            sender_name: get("MFA_SENDER_NAME").unwrap_or_else(|| "MFA Gate".into()),
        };
        let token_ttl_minutes = match get("MFA_TOKEN_TTL_MINUTES") {
            // A malformed TTL is a configuration error, not a default.
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|v| *v > 0)
                .with_context(|| {
                    format!("MFA_TOKEN_TTL_MINUTES must be a positive integer, got {raw:?}")
                })?,
            None => 5,
        };
        Ok(Self {
            database_url,
            notifier,
            mfa: MfaConfig { token_ttl_minutes },
        })
    }
}

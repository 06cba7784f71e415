use crate::auth::error::AuthError;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::repo_types::{NewUser, User};
use crate::auth::store::CredentialStore;
use crate::auth::token;
use crate::notifier::Notifier;
use crate::state::AppState;
use axum::extract::FromRef;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{error, info};

/// The authentication engine. Stateless: all state lives in the store.
///
/// Registration and login both funnel into [`AuthService::issue_token`], so
/// there is a single "pending second factor" path; a login never completes
/// without the second factor.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    notifier: Arc<dyn Notifier>,
    token_ttl_minutes: i64,
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(
            state.store.clone(),
            state.notifier.clone(),
            state.config.mfa.token_ttl_minutes,
        )
    }
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        notifier: Arc<dyn Notifier>,
        token_ttl_minutes: i64,
    ) -> Self {
        Self {
            store,
            notifier,
            token_ttl_minutes,
        }
    }

    /// Create a user and immediately put them into the pending-second-factor
    /// state. Duplicate emails are rejected by the store's unique constraint.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        full_name: Option<String>,
    ) -> Result<User, AuthError> {
        let password_hash = hash_password(password)?;
        let user = self
            .store
            .create_user(&NewUser {
                email: email.to_string(),
                password_hash,
                full_name,
            })
            .await?;
        info!(user_id = %user.id, email = %user.email, "user registered");
        self.issue_token(&user).await?;
        Ok(user)
    }

    /// First factor. Each check is a distinct failure mode, in order:
    /// unknown email, wrong password, inactive account. Success never logs
    /// the caller in; it only issues the second factor.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let user = self
            .store
            .find_by_email(email)
            .await?
            .ok_or(AuthError::UnknownUser)?;

        if !verify_password(password, &user.password_hash)? {
            return Err(AuthError::BadCredentials);
        }
        if !user.is_active {
            return Err(AuthError::AccountInactive);
        }

        info!(user_id = %user.id, email = %user.email, "credentials verified");
        self.issue_token(&user).await
    }

    /// Second factor. The lookup matches email and exact code; the match and
    /// expiry are re-checked before the conditional consume clears the pair.
    /// Every failure collapses into `InvalidOrExpiredToken` so callers cannot
    /// tell which sub-check rejected them.
    pub async fn verify_mfa(&self, email: &str, code: &str) -> Result<(), AuthError> {
        let user = self
            .store
            .find_by_email_and_token(email, code)
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        let now = OffsetDateTime::now_utc();
        match (user.mfa_token.as_deref(), user.mfa_token_expires_at) {
            (Some(pending), Some(expires_at)) if pending == code && now <= expires_at => {}
            _ => return Err(AuthError::InvalidOrExpiredToken),
        }

        // Verify-then-clear in one conditional write: a concurrent
        // verification or an expiry between the lookup and here loses.
        let consumed = self.store.consume_mfa_token(user.id, code, now).await?;
        if !consumed {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        info!(user_id = %user.id, email = %user.email, "mfa token consumed");
        Ok(())
    }

    /// Issue a fresh code and hand it to the notifier. Overwrites any
    /// still-pending code; the old one becomes unusable the moment the new
    /// pair is persisted. Delivery failure is logged and swallowed so the
    /// surrounding registration/login call still succeeds.
    async fn issue_token(&self, user: &User) -> Result<(), AuthError> {
        let code = token::generate_code();
        let expires_at = token::expiry_after(OffsetDateTime::now_utc(), self.token_ttl_minutes);
        self.store.set_mfa_token(user.id, &code, expires_at).await?;

        if let Err(e) = self.notifier.send_code(&user.email, &code).await {
            error!(
                user_id = %user.id,
                email = %user.email,
                error = %e,
                "delivery_failed: pending mfa code was not delivered"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::MemoryStore;
    use crate::notifier::{FailingNotifier, RecordingNotifier};
    use time::Duration;

    const EMAIL: &str = "alice@example.com";
    const PASSWORD: &str = "pw123-long-enough";

    fn service() -> (AuthService, Arc<MemoryStore>, Arc<RecordingNotifier>) {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let auth = AuthService::new(store.clone(), notifier.clone(), 5);
        (auth, store, notifier)
    }

    fn assert_code_shape(code: &str) {
        assert_eq!(code.len(), 6);
        let value: u32 = code.parse().expect("code is numeric");
        assert!((100_000..=999_999).contains(&value));
    }

    #[tokio::test]
    async fn register_persists_user_and_issues_code() {
        let (auth, store, notifier) = service();
        let user = auth
            .register(EMAIL, PASSWORD, Some("Alice".into()))
            .await
            .unwrap();

        assert_eq!(user.email, EMAIL);
        assert_ne!(user.password_hash, PASSWORD);

        let stored = store.get(EMAIL).unwrap();
        let code = notifier.last_code_for(EMAIL).expect("code delivered");
        assert_code_shape(&code);
        assert_eq!(stored.mfa_token.as_deref(), Some(code.as_str()));
        assert!(stored.mfa_token_expires_at.is_some());
    }

    #[tokio::test]
    async fn duplicate_registration_fails_and_leaves_original_untouched() {
        let (auth, store, _notifier) = service();
        auth.register(EMAIL, PASSWORD, None).await.unwrap();
        let before = store.get(EMAIL).unwrap();

        let err = auth.register(EMAIL, "other-password", None).await.unwrap_err();
        assert!(matches!(err, AuthError::DuplicateEmail));

        let after = store.get(EMAIL).unwrap();
        assert_eq!(after.id, before.id);
        assert_eq!(after.password_hash, before.password_hash);
        assert_eq!(after.mfa_token, before.mfa_token);
        assert_eq!(after.mfa_token_expires_at, before.mfa_token_expires_at);
    }

    #[tokio::test]
    async fn login_issues_fresh_code_with_five_minute_expiry() {
        let (auth, store, notifier) = service();
        auth.register(EMAIL, PASSWORD, None).await.unwrap();

        let before = OffsetDateTime::now_utc();
        auth.login(EMAIL, PASSWORD).await.unwrap();
        let after = OffsetDateTime::now_utc();

        let stored = store.get(EMAIL).unwrap();
        let code = notifier.last_code_for(EMAIL).unwrap();
        assert_code_shape(&code);
        assert_eq!(stored.mfa_token.as_deref(), Some(code.as_str()));

        let expires_at = stored.mfa_token_expires_at.unwrap();
        assert!(expires_at >= before + Duration::minutes(5));
        assert!(expires_at <= after + Duration::minutes(5));
    }

    #[tokio::test]
    async fn login_with_wrong_password_fails_and_leaves_mfa_fields_alone() {
        let (auth, store, _notifier) = service();
        auth.register(EMAIL, PASSWORD, None).await.unwrap();
        let before = store.get(EMAIL).unwrap();

        let err = auth.login(EMAIL, "wrong-password").await.unwrap_err();
        assert!(matches!(err, AuthError::BadCredentials));

        let after = store.get(EMAIL).unwrap();
        assert_eq!(after.mfa_token, before.mfa_token);
        assert_eq!(after.mfa_token_expires_at, before.mfa_token_expires_at);
    }

    #[tokio::test]
    async fn login_with_unknown_email_fails() {
        let (auth, _store, _notifier) = service();
        let err = auth.login("nobody@example.com", PASSWORD).await.unwrap_err();
        assert!(matches!(err, AuthError::UnknownUser));
    }

    #[tokio::test]
    async fn login_on_inactive_account_fails_after_password_check() {
        let (auth, store, notifier) = service();
        auth.register(EMAIL, PASSWORD, None).await.unwrap();
        store.deactivate(EMAIL);
        let sent_before = notifier.sent().len();

        let err = auth.login(EMAIL, PASSWORD).await.unwrap_err();
        assert!(matches!(err, AuthError::AccountInactive));
        // Wrong password still wins over the inactive gate.
        let err = auth.login(EMAIL, "wrong-password").await.unwrap_err();
        assert!(matches!(err, AuthError::BadCredentials));
        // No code went out for either attempt.
        assert_eq!(notifier.sent().len(), sent_before);
    }

    #[tokio::test]
    async fn verify_consumes_the_code_exactly_once() {
        let (auth, store, notifier) = service();
        auth.register(EMAIL, PASSWORD, None).await.unwrap();
        let code = notifier.last_code_for(EMAIL).unwrap();

        auth.verify_mfa(EMAIL, &code).await.unwrap();
        let stored = store.get(EMAIL).unwrap();
        assert!(stored.mfa_token.is_none());
        assert!(stored.mfa_token_expires_at.is_none());

        // Replay of the consumed code is rejected.
        let err = auth.verify_mfa(EMAIL, &code).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidOrExpiredToken));
    }

    #[tokio::test]
    async fn verify_rejects_wrong_code_without_consuming() {
        let (auth, store, _notifier) = service();
        auth.register(EMAIL, PASSWORD, None).await.unwrap();

        let err = auth.verify_mfa(EMAIL, "000000").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidOrExpiredToken));
        assert!(store.get(EMAIL).unwrap().mfa_token.is_some());
    }

    #[tokio::test]
    async fn verify_rejects_expired_code() {
        let (auth, store, notifier) = service();
        auth.register(EMAIL, PASSWORD, None).await.unwrap();
        let code = notifier.last_code_for(EMAIL).unwrap();

        store.set_token_expiry(EMAIL, OffsetDateTime::now_utc() - Duration::minutes(1));

        let err = auth.verify_mfa(EMAIL, &code).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidOrExpiredToken));
    }

    #[tokio::test]
    async fn new_issuance_supersedes_the_pending_code() {
        let (auth, _store, notifier) = service();
        auth.register(EMAIL, PASSWORD, None).await.unwrap();
        let first = notifier.last_code_for(EMAIL).unwrap();

        auth.login(EMAIL, PASSWORD).await.unwrap();
        let second = notifier.last_code_for(EMAIL).unwrap();

        if first != second {
            let err = auth.verify_mfa(EMAIL, &first).await.unwrap_err();
            assert!(matches!(err, AuthError::InvalidOrExpiredToken));
        }
        auth.verify_mfa(EMAIL, &second).await.unwrap();
    }

    #[tokio::test]
    async fn expired_code_then_relogin_then_verify_succeeds() {
        // register -> login issues C1 -> C1 expires -> verify(C1) fails ->
        // re-login issues C2 -> verify(C2) succeeds.
        let (auth, store, notifier) = service();
        auth.register(EMAIL, PASSWORD, None).await.unwrap();

        auth.login(EMAIL, PASSWORD).await.unwrap();
        let c1 = notifier.last_code_for(EMAIL).unwrap();
        store.set_token_expiry(EMAIL, OffsetDateTime::now_utc() - Duration::minutes(1));

        let err = auth.verify_mfa(EMAIL, &c1).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidOrExpiredToken));

        auth.login(EMAIL, PASSWORD).await.unwrap();
        let c2 = notifier.last_code_for(EMAIL).unwrap();
        auth.verify_mfa(EMAIL, &c2).await.unwrap();
    }

    #[tokio::test]
    async fn delivery_failure_is_swallowed_but_code_stays_pending() {
        let store = Arc::new(MemoryStore::new());
        let auth = AuthService::new(store.clone(), Arc::new(FailingNotifier), 5);

        auth.register(EMAIL, PASSWORD, None).await.unwrap();
        auth.login(EMAIL, PASSWORD).await.unwrap();

        // The user never received the code, but it is pending in the store.
        let stored = store.get(EMAIL).unwrap();
        assert!(stored.mfa_token.is_some());
        assert!(stored.mfa_token_expires_at.is_some());
    }

    #[tokio::test]
    async fn configured_ttl_drives_expiry() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let auth = AuthService::new(store.clone(), notifier, 1);

        let before = OffsetDateTime::now_utc();
        auth.register(EMAIL, PASSWORD, None).await.unwrap();

        let expires_at = store.get(EMAIL).unwrap().mfa_token_expires_at.unwrap();
        assert!(expires_at >= before + Duration::minutes(1));
        assert!(expires_at < before + Duration::minutes(2));
    }
}

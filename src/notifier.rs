use crate::config::NotifierConfig;
use anyhow::Context;
use axum::async_trait;
use serde::Serialize;
use std::sync::Mutex;
use tracing::debug;

const BREVO_SEND_URL: &str = "https://api.brevo.com/v3/smtp/email";

/// Out-of-band delivery channel for MFA codes.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_code(&self, email: &str, code: &str) -> anyhow::Result<()>;
}

/// Sends codes through Brevo's transactional email API.
///
/// Credentials are injected once at startup; the client is never mutated
/// per request.
pub struct BrevoNotifier {
    client: reqwest::Client,
    api_key: String,
    sender_email: String,
    sender_name: String,
}

#[derive(Debug, Serialize)]
struct Party {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendEmailRequest {
    sender: Party,
    to: Vec<Party>,
    subject: String,
    html_content: String,
}

impl BrevoNotifier {
    pub fn new(config: &NotifierConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("build brevo http client")?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            sender_email: config.sender_email.clone(),
            sender_name: config.sender_name.clone(),
        })
    }

    fn build_request(&self, email: &str, code: &str) -> SendEmailRequest {
        SendEmailRequest {
            sender: Party {
                email: self.sender_email.clone(),
                name: Some(self.sender_name.clone()),
            },
            to: vec![Party {
                email: email.to_string(),
                name: None,
            }],
            subject: "Your verification code".to_string(),
            html_content: format!(
                "<html><body><h1>Your verification code is: {code}</h1></body></html>"
            ),
        }
    }
}

#[async_trait]
impl Notifier for BrevoNotifier {
    async fn send_code(&self, email: &str, code: &str) -> anyhow::Result<()> {
        let body = self.build_request(email, code);
        let response = self
            .client
            .post(BREVO_SEND_URL)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("brevo send request")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("brevo rejected the send with status {status}");
        }
        debug!(email = %email, "verification code handed to brevo");
        Ok(())
    }
}

/// Records sent codes instead of delivering them. Used by tests.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }

    pub fn last_code_for(&self, email: &str) -> Option<String> {
        self.sent()
            .iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, code)| code.clone())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_code(&self, email: &str, code: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push((email.to_string(), code.to_string()));
        Ok(())
    }
}

/// Always fails delivery. Used by tests for the swallow-and-log policy.
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send_code(&self, _email: &str, _code: &str) -> anyhow::Result<()> {
        anyhow::bail!("delivery provider unavailable")
    }
}

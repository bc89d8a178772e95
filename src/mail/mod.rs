mod http;
pub mod templates;

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

pub use http::HttpMailer;

/// Result type for mail delivery
pub type MailResult<T> = Result<T, MailError>;

pub type MessageId = String;

/// Errors that can occur while handing mail to the gateway
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail API request failed: {0}")]
    ApiError(String),

    #[error("invalid mail configuration: {0}")]
    ConfigError(String),

    #[error("missing recipient address")]
    NoRecipient,
}

/// One transactional email
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Notification Gateway.
///
/// Callers treat every failure as non-fatal: game state never waits on
/// delivery.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> MailResult<MessageId>;

    /// Name of the backend for logs
    fn name(&self) -> &str;
}

/// Writes mail to the log instead of delivering it (development default)
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> MailResult<MessageId> {
        if mail.to.is_empty() {
            return Err(MailError::NoRecipient);
        }
        tracing::info!(to = %mail.to, subject = %mail.subject, "Mail not delivered (log mailer)");
        Ok(ulid::Ulid::new().to_string())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Keeps every message in memory; can be switched to fail every send
#[derive(Debug, Default, Clone)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<OutgoingMail>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut flag) = self.failing.lock() {
            *flag = failing;
        }
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Messages addressed to `to`
    pub fn sent_to(&self, to: &str) -> Vec<OutgoingMail> {
        self.sent().into_iter().filter(|m| m.to == to).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: OutgoingMail) -> MailResult<MessageId> {
        if self.failing.lock().map(|f| *f).unwrap_or(false) {
            return Err(MailError::ApiError("recording mailer set to fail".to_string()));
        }
        if mail.to.is_empty() {
            return Err(MailError::NoRecipient);
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(mail);
        }
        Ok(ulid::Ulid::new().to_string())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Mail relay settings from the environment
#[derive(Debug, Clone, Default)]
pub struct MailConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: Option<String>,
}

impl MailConfig {
    pub fn from_env() -> Self {
        Self {
            api_url: crate::config::env_string("MAIL_API_URL"),
            api_key: crate::config::env_string("MAIL_API_KEY"),
            from: crate::config::env_string("EMAIL_FROM"),
        }
    }

    /// HTTP relay when fully configured, otherwise the log mailer
    pub fn build_mailer(&self) -> MailResult<Arc<dyn Mailer>> {
        match (&self.api_url, &self.from) {
            (Some(url), Some(from)) => Ok(Arc::new(HttpMailer::new(
                url.clone(),
                self.api_key.clone(),
                from.clone(),
            )?)),
            (Some(_), None) => Err(MailError::ConfigError(
                "EMAIL_FROM is required when MAIL_API_URL is set".to_string(),
            )),
            (None, _) => Ok(Arc::new(LogMailer)),
        }
    }
}

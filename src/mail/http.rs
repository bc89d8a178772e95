use super::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delivers mail through a JSON HTTP relay (`POST {api_url}`)
pub struct HttpMailer {
    api_url: String,
    api_key: Option<String>,
    from: String,
    client: reqwest::Client,
}

impl HttpMailer {
    pub fn new(api_url: String, api_key: Option<String>, from: String) -> MailResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| MailError::ConfigError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_url,
            api_key,
            from,
            client,
        })
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(alias = "messageId", alias = "message_id")]
    id: Option<String>,
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, mail: OutgoingMail) -> MailResult<MessageId> {
        if mail.to.is_empty() {
            return Err(MailError::NoRecipient);
        }

        let body = SendRequest {
            from: &self.from,
            to: &mail.to,
            subject: &mail.subject,
            html: &mail.html,
            text: &mail.text,
        };

        let mut request = self.client.post(&self.api_url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MailError::ApiError(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(MailError::ApiError(format!(
                "relay returned {}: {}",
                status, detail
            )));
        }

        // Relays that answer without an id still accepted the message
        let parsed = response.json::<SendResponse>().await.ok();
        Ok(parsed
            .and_then(|r| r.id)
            .unwrap_or_else(|| ulid::Ulid::new().to_string()))
    }

    fn name(&self) -> &str {
        "http"
    }
}

use async_trait::async_trait;
use flows::{Envelope, MailStatus, Mailer};
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};
use url::Url;

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Hands mail to an HTTP relay that owns SMTP delivery.
pub struct MailRelay {
    http: Client,
    endpoint: Url,
    from: String,
}

impl MailRelay {
    pub fn new(endpoint: Url, from: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            endpoint,
            from: from.into(),
        }
    }
}

#[async_trait]
impl Mailer for MailRelay {
    async fn send(&self, envelope: Envelope) -> MailStatus {
        let result = self
            .http
            .post(self.endpoint.clone())
            .json(&RelayMessage {
                from: &self.from,
                to: &envelope.to,
                subject: &envelope.subject,
                body: &envelope.body,
            })
            .send()
            .await
            .and_then(|response| response.error_for_status());

        match result {
            Ok(_) => MailStatus::Sent,
            Err(err) => {
                warn!(to = %envelope.to, error = %err, "mail relay rejected message");
                MailStatus::Failed(err.to_string())
            }
        }
    }
}

/// Writes mail to the log instead of sending it.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, envelope: Envelope) -> MailStatus {
        info!(to = %envelope.to, subject = %envelope.subject, "mail not sent: no relay configured");
        MailStatus::Sent
    }
}

#[cfg(test)]
#[path = "tests/mail_tests.rs"]
mod tests;

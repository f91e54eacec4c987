use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::{Mail, MailError, Mailer};
use crate::config::MailConfig;

/// Delivers mail through a JSON mail API (`POST {endpoint}` with a bearer
/// key). Each call is bounded by `mail.timeout_secs`.
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    from: String,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct Outgoing<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

impl HttpMailer {
    pub fn new(config: &MailConfig) -> anyhow::Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| anyhow::anyhow!("mail.endpoint is not set"))?;
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            endpoint,
            api_key: config.api_key.clone(),
            from: config.from.clone(),
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, mail: Mail) -> Result<(), MailError> {
        let mut request = self.client.post(&self.endpoint).json(&Outgoing {
            from: &self.from,
            to: &mail.to,
            subject: &mail.subject,
            html: &mail.html,
        });
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = tokio::time::timeout(Duration::from_secs(self.timeout_secs), request.send())
            .await
            .map_err(|_| MailError::Timeout(self.timeout_secs))??;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(to = %mail.to, "Mail service answered {}", status);
            return Err(MailError::Rejected(status.as_u16()));
        }

        tracing::debug!(to = %mail.to, subject = %mail.subject, "Mail delivered");
        Ok(())
    }
}

use async_trait::async_trait;

use super::{Mail, MailError, Mailer};

/// Writes mail to the log instead of delivering it. Used in development.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: Mail) -> Result<(), MailError> {
        tracing::info!(to = %mail.to, subject = %mail.subject, "Mail: {}", mail.html);
        Ok(())
    }
}

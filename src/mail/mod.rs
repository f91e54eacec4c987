//! Outbound mail. Handlers only see the [`Mailer`] trait; the transport is
//! picked from configuration at startup.

mod http;
mod log;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::{MailConfig, MailTransport};

pub use self::http::HttpMailer;
pub use self::log::LogMailer;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("mail service rejected the message with status {0}")]
    Rejected(u16),

    #[error("mail service did not answer within {0}s")]
    Timeout(u64),

    #[error("{0}")]
    Transport(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: Mail) -> Result<(), MailError>;
}

pub fn build_mailer(config: &MailConfig) -> anyhow::Result<Arc<dyn Mailer>> {
    match config.transport {
        MailTransport::Log => Ok(Arc::new(LogMailer)),
        MailTransport::Http => Ok(Arc::new(HttpMailer::new(config)?)),
    }
}

pub fn verification_mail(to: &str, link: &str) -> Mail {
    Mail {
        to: to.to_string(),
        subject: "Verify your email".to_string(),
        html: format!(
            "<div><p>Click on the link below to verify your email</p>\
             <a href=\"{link}\">Verify</a></div>"
        ),
    }
}

pub fn reset_password_mail(to: &str, link: &str) -> Mail {
    Mail {
        to: to.to_string(),
        subject: "Reset password".to_string(),
        html: format!(
            "<div><p>Click on the link below to reset your password</p>\
             <a href=\"{link}\">Reset password</a></div>"
        ),
    }
}

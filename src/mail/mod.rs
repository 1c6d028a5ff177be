//! Outgoing email.

mod smtp;
pub mod templates;

pub use smtp::{SmtpMailer, SmtpSettings};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address {0}")]
    Address(String),

    #[error("failed to build message")]
    Build(#[source] lettre::error::Error),

    #[error("SMTP delivery failed")]
    Smtp(#[source] lettre::transport::smtp::Error),
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), MailError>;
}

/// Writes messages to the log instead of delivering them. Used when no SMTP host is configured.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        tracing::info!(to = %email.to, subject = %email.subject, body = %email.body, "email (not delivered)");
        Ok(())
    }
}

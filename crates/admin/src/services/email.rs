//! Email delivery over SMTP.
//!
//! Uses lettre's async transport with STARTTLS and username/password auth.
//! Callers depend on the [`Mailer`] trait so delivery can be faked in tests.

use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::header::ContentType,
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::instrument;

use crate::config::EmailConfig;

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    /// Delivery did not finish in time.
    #[error("SMTP delivery timed out after {0:?}")]
    Timeout(Duration),
}

/// A plain-text message ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Sends one email.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver `email`, returning once the server accepted it.
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError>;
}

/// SMTP mailer for transactional email.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    timeout: Duration,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// No connection is opened until the first send.
    ///
    /// # Errors
    ///
    /// Returns error if the relay host is invalid.
    pub fn new(config: &EmailConfig) -> Result<Self, EmailError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .timeout(Some(config.timeout))
            .build();

        // Reject a bad sender at startup instead of on every send.
        config
            .from_address
            .parse::<lettre::message::Mailbox>()
            .map_err(|_| EmailError::InvalidAddress(config.from_address.clone()))?;

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
            timeout: config.timeout,
        })
    }
}

#[async_trait]
impl Mailer for EmailService {
    #[instrument(skip(self, email), fields(to = %email.to, subject = %email.subject))]
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        let message = build_message(&self.from_address, email)?;

        tokio::time::timeout(self.timeout, self.mailer.send(message))
            .await
            .map_err(|_| EmailError::Timeout(self.timeout))??;

        tracing::info!("Email sent successfully");
        Ok(())
    }
}

impl std::fmt::Debug for EmailService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailService")
            .field("from_address", &self.from_address)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Build a plain-text message.
fn build_message(from: &str, email: &OutgoingEmail) -> Result<Message, EmailError> {
    let message = Message::builder()
        .from(
            from.parse()
                .map_err(|_| EmailError::InvalidAddress(from.to_string()))?,
        )
        .to(email
            .to
            .parse()
            .map_err(|_| EmailError::InvalidAddress(email.to.clone()))?)
        .subject(email.subject.clone())
        .header(ContentType::TEXT_PLAIN)
        .body(email.body.clone())?;
    Ok(message)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn config() -> EmailConfig {
        EmailConfig {
            smtp_host: "smtp.rbl.test".to_string(),
            smtp_port: 587,
            smtp_username: "mailer".to_string(),
            smtp_password: SecretString::from("pw"),
            from_address: "RBL Sourcing <reminders@rbl.test>".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_build_message_headers() {
        let email = OutgoingEmail {
            to: "buyer@rbl.test".to_string(),
            subject: "Reminder: Call supplier".to_string(),
            body: "Hi".to_string(),
        };
        let message = build_message("reminders@rbl.test", &email).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: buyer@rbl.test"));
        assert!(raw.contains("Subject: Reminder: Call supplier"));
        assert!(raw.contains("Content-Type: text/plain"));
    }

    #[test]
    fn test_build_message_rejects_bad_recipient() {
        let email = OutgoingEmail {
            to: "not an address".to_string(),
            subject: "s".to_string(),
            body: "b".to_string(),
        };
        assert!(matches!(
            build_message("reminders@rbl.test", &email),
            Err(EmailError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_new_validates_sender() {
        assert!(EmailService::new(&config()).is_ok());

        let mut bad = config();
        bad.from_address = "nobody".to_string();
        assert!(matches!(
            EmailService::new(&bad),
            Err(EmailError::InvalidAddress(_))
        ));
    }
}

//! Mailer that records messages instead of sending them.

use std::sync::Mutex;

use async_trait::async_trait;
use rbl_admin::services::{EmailError, Mailer, OutgoingEmail};

#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    rejected: Vec<String>,
}

impl RecordingMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose server refuses these recipients.
    #[must_use]
    pub fn rejecting(recipients: &[&str]) -> Self {
        Self {
            sent: Mutex::default(),
            rejected: recipients.iter().map(ToString::to_string).collect(),
        }
    }

    /// Messages accepted so far.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    #[must_use]
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().expect("mailer lock poisoned").clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        if self.rejected.contains(&email.to) {
            return Err(EmailError::InvalidAddress(email.to.clone()));
        }
        self.sent
            .lock()
            .expect("mailer lock poisoned")
            .push(email.clone());
        Ok(())
    }
}

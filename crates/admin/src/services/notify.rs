//! Reminder notification emails.

use askama::Template;
use tracing::instrument;

use super::email::{EmailError, Mailer, OutgoingEmail};
use super::reminders::DueReminder;

/// Plain text body for a reminder email.
#[derive(Template)]
#[template(path = "email/reminder.txt")]
struct ReminderEmailText<'a> {
    topic: &'a str,
    description: &'a str,
    scheduled_for: String,
}

/// Formats and sends one email per due reminder.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher<M> {
    mailer: M,
}

impl<M: Mailer> NotificationDispatcher<M> {
    pub const fn new(mailer: M) -> Self {
        Self { mailer }
    }

    /// Build the email for a reminder.
    ///
    /// # Errors
    ///
    /// Returns `EmailError::Template` if the body fails to render.
    pub fn compose(reminder: &DueReminder) -> Result<OutgoingEmail, EmailError> {
        let body = ReminderEmailText {
            topic: &reminder.topic,
            description: &reminder.description,
            scheduled_for: reminder
                .scheduled_at
                .format("%Y-%m-%d %H:%M UTC")
                .to_string(),
        }
        .render()?;

        Ok(OutgoingEmail {
            to: reminder.recipient.to_string(),
            subject: format!("Reminder: {}", reminder.topic),
            body,
        })
    }

    /// Send the reminder email.
    ///
    /// # Errors
    ///
    /// Returns the delivery error; the caller decides whether to retry.
    #[instrument(skip(self, reminder), fields(reminder_id = %reminder.id))]
    pub async fn dispatch(&self, reminder: &DueReminder) -> Result<(), EmailError> {
        let email = Self::compose(reminder)?;
        self.mailer.send(&email).await
    }

    #[cfg(test)]
    pub(crate) const fn mailer(&self) -> &M {
        &self.mailer
    }
}

//! One-off reminder passes.
//!
//! # Environment Variables
//!
//! - `RECORD_STORE_URL`, `RECORD_STORE_ADMIN_EMAIL`, `RECORD_STORE_ADMIN_PASSWORD`
//! - `SMTP_*` - Mail settings (`tick` only)
//! - `REMINDER_MAX_ATTEMPTS` - Attempt cap before a reminder is marked failed

use chrono::Utc;
use rbl_admin::config::{EmailConfig, ReminderConfig};
use rbl_admin::services::{EmailService, ReminderScheduler, partition_due};
use rbl_admin::store::collections::REMINDERS;
use rbl_admin::store::{FULL_LIST_PAGE_SIZE, ListQuery, RecordStore};

use super::{CommandError, connect};

/// Log the reminders a tick would deliver right now.
pub async fn due() -> Result<(), CommandError> {
    let store = connect().await?;
    let records = store
        .list_all(REMINDERS, &ListQuery::new().per_page(FULL_LIST_PAGE_SIZE))
        .await?;

    let partition = partition_due(&records, Utc::now());
    for reminder in &partition.due {
        tracing::info!(
            "{} due {} to {} ({} previous attempts): {}",
            reminder.id,
            reminder.scheduled_at.format("%Y-%m-%d %H:%M UTC"),
            reminder.recipient,
            reminder.attempts,
            reminder.topic
        );
    }
    for skipped in &partition.skipped {
        tracing::warn!("{} skipped: {}", skipped.id, skipped.reason);
    }
    tracing::info!(
        "{} reminders: {} due, {} upcoming, {} settled, {} skipped",
        records.len(),
        partition.due.len(),
        partition.upcoming,
        partition.settled,
        partition.skipped.len()
    );
    Ok(())
}

/// Deliver due reminders once.
pub async fn tick() -> Result<(), CommandError> {
    let store = connect().await?;
    let mailer = EmailService::new(&EmailConfig::from_env()?)?;
    let reminders = ReminderConfig::from_env()?;

    let scheduler = ReminderScheduler::new(store, mailer, reminders.max_attempts);
    let report = scheduler.tick(Utc::now()).await?;
    tracing::info!(
        "Tick complete: {}",
        serde_json::to_string(&report).unwrap_or_default()
    );
    Ok(())
}

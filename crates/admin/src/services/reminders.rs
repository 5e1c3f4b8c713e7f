//! Periodic reminder delivery.
//!
//! Each tick lists every reminder, selects the due ones, emails them and
//! writes the outcome back. Delivery is at-least-once: a crash between the
//! send and the write-back resends on the next tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rbl_core::{Email, ReminderState, parse_utc_timestamp};
use serde::Serialize;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::instrument;

use super::email::Mailer;
use super::notify::NotificationDispatcher;
use crate::store::collections::REMINDERS;
use crate::store::{FULL_LIST_PAGE_SIZE, ListQuery, Record, RecordStore, StoreError};

/// Reminder record fields.
pub mod fields {
    pub const TOPIC: &str = "topic";
    pub const DESCRIPTION: &str = "description";
    pub const DATETIME: &str = "datetime";
    pub const EMAIL: &str = "email";
    pub const SENT: &str = "sent";
    pub const FAILED: &str = "failed";
    pub const ATTEMPTS: &str = "attempts";
}

/// A reminder ready to be emailed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueReminder {
    pub id: String,
    pub topic: String,
    pub description: String,
    pub scheduled_at: DateTime<Utc>,
    pub recipient: Email,
    pub attempts: u32,
}

/// Why a pending reminder was left out of the due set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingSchedule,
    UnparsableSchedule(String),
    MissingRecipient,
    InvalidRecipient(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingSchedule => write!(f, "no scheduled time"),
            Self::UnparsableSchedule(raw) => write!(f, "unparsable scheduled time {raw:?}"),
            Self::MissingRecipient => write!(f, "no recipient address"),
            Self::InvalidRecipient(raw) => write!(f, "invalid recipient address {raw:?}"),
        }
    }
}

impl SkipReason {
    /// No send can succeed until the reminder is edited.
    #[must_use]
    pub const fn is_undeliverable(&self) -> bool {
        matches!(self, Self::MissingRecipient | Self::InvalidRecipient(_))
    }
}

/// A reminder excluded from delivery, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub id: String,
    pub reason: SkipReason,
}

/// Reminders split by what the scheduler should do with them.
#[derive(Debug, Default)]
pub struct DuePartition {
    pub due: Vec<DueReminder>,
    /// Pending but scheduled in the future.
    pub upcoming: usize,
    /// Already dispatched or dead-lettered.
    pub settled: usize,
    pub skipped: Vec<Skipped>,
}

/// Split reminder records into due, upcoming, settled and skipped.
///
/// Pure: calling it twice with the same input yields the same partition.
#[must_use]
pub fn partition_due(records: &[Record], now: DateTime<Utc>) -> DuePartition {
    let mut partition = DuePartition::default();

    for record in records {
        let state = ReminderState::from_flags(
            record.bool_field(fields::SENT),
            record.bool_field(fields::FAILED),
        );
        if !state.is_pending() {
            partition.settled += 1;
            continue;
        }

        match classify(record) {
            Ok(reminder) if reminder.scheduled_at <= now => partition.due.push(reminder),
            Ok(_) => partition.upcoming += 1,
            Err(reason) => partition.skipped.push(Skipped {
                id: record.id.clone(),
                reason,
            }),
        }
    }

    partition
}

fn classify(record: &Record) -> Result<DueReminder, SkipReason> {
    let raw_schedule = record
        .str_field(fields::DATETIME)
        .ok_or(SkipReason::MissingSchedule)?;
    let scheduled_at = parse_utc_timestamp(raw_schedule)
        .map_err(|_| SkipReason::UnparsableSchedule(raw_schedule.to_string()))?;

    let raw_email = record
        .str_field(fields::EMAIL)
        .ok_or(SkipReason::MissingRecipient)?;
    let recipient =
        Email::parse(raw_email).map_err(|_| SkipReason::InvalidRecipient(raw_email.to_string()))?;

    Ok(DueReminder {
        id: record.id.clone(),
        topic: record.text(fields::TOPIC).to_string(),
        description: record.text(fields::DESCRIPTION).to_string(),
        scheduled_at,
        recipient,
        attempts: record.u32_field(fields::ATTEMPTS),
    })
}

/// Counts from one scheduler tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub scanned: usize,
    pub due: usize,
    pub dispatched: usize,
    /// Delivery failed; the reminder stays pending for another attempt.
    pub failed: usize,
    /// Delivery failed and the attempt cap was reached, or the recipient
    /// address can never be delivered to.
    pub dead_lettered: usize,
    pub skipped: usize,
    /// Outcome could not be recorded on the reminder.
    pub write_back_errors: usize,
}

/// Delivers due reminders and records the outcome.
pub struct ReminderScheduler<S, M> {
    store: S,
    dispatcher: NotificationDispatcher<M>,
    max_attempts: u32,
}

impl<S: RecordStore, M: Mailer> ReminderScheduler<S, M> {
    pub fn new(store: S, mailer: M, max_attempts: u32) -> Self {
        Self {
            store,
            dispatcher: NotificationDispatcher::new(mailer),
            max_attempts: max_attempts.max(1),
        }
    }

    /// List every reminder and partition it at `now`.
    ///
    /// # Errors
    ///
    /// Returns the store error if reminders cannot be listed.
    pub async fn due(&self, now: DateTime<Utc>) -> Result<(usize, DuePartition), StoreError> {
        let records = self
            .store
            .list_all(REMINDERS, &ListQuery::new().per_page(FULL_LIST_PAGE_SIZE))
            .await?;
        Ok((records.len(), partition_due(&records, now)))
    }

    /// Run one delivery pass.
    ///
    /// Per-reminder failures are counted, never returned.
    ///
    /// # Errors
    ///
    /// Returns the store error if reminders cannot be listed; nothing is sent.
    #[instrument(skip(self))]
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport, StoreError> {
        let (scanned, partition) = self.due(now).await?;

        let mut report = TickReport {
            scanned,
            due: partition.due.len(),
            skipped: partition.skipped.len(),
            ..TickReport::default()
        };

        for skipped in &partition.skipped {
            tracing::warn!(
                reminder_id = %skipped.id,
                reason = %skipped.reason,
                dead_letter = skipped.reason.is_undeliverable(),
                "Skipping reminder"
            );
            if skipped.reason.is_undeliverable() {
                self.dead_letter(&skipped.id, &mut report).await;
            }
        }

        for reminder in &partition.due {
            self.deliver(reminder, &mut report).await;
        }

        Ok(report)
    }

    async fn deliver(&self, reminder: &DueReminder, report: &mut TickReport) {
        let (patch, dead_letter) = match self.dispatcher.dispatch(reminder).await {
            Ok(()) => {
                report.dispatched += 1;
                (json!({ (fields::SENT): true }), false)
            }
            Err(e) => {
                let attempts = reminder.attempts.saturating_add(1);
                let dead_letter = attempts >= self.max_attempts;
                tracing::warn!(
                    reminder_id = %reminder.id,
                    attempts,
                    dead_letter,
                    error = %e,
                    "Reminder delivery failed"
                );
                if dead_letter {
                    report.dead_lettered += 1;
                } else {
                    report.failed += 1;
                }
                (
                    json!({ (fields::ATTEMPTS): attempts, (fields::FAILED): dead_letter }),
                    dead_letter,
                )
            }
        };

        if let Err(e) = self.store.update(REMINDERS, &reminder.id, &patch).await {
            report.write_back_errors += 1;
            tracing::error!(
                reminder_id = %reminder.id,
                dead_letter,
                error = %e,
                "Failed to record reminder delivery state"
            );
        }
    }

    /// Mark a reminder failed so later ticks leave it alone.
    async fn dead_letter(&self, id: &str, report: &mut TickReport) {
        match self
            .store
            .update(REMINDERS, id, &json!({ (fields::FAILED): true }))
            .await
        {
            Ok(_) => report.dead_lettered += 1,
            Err(e) => {
                report.write_back_errors += 1;
                tracing::error!(reminder_id = %id, error = %e, "Failed to dead-letter reminder");
            }
        }
    }

    async fn run_tick(&self) {
        match self.tick(Utc::now()).await {
            Ok(report) if report.due == 0 && report.skipped == 0 => {
                tracing::debug!(scanned = report.scanned, "No reminders due");
            }
            Ok(report) => tracing::info!(
                scanned = report.scanned,
                due = report.due,
                dispatched = report.dispatched,
                failed = report.failed,
                dead_lettered = report.dead_lettered,
                skipped = report.skipped,
                write_back_errors = report.write_back_errors,
                "Reminder tick complete"
            ),
            Err(e) => tracing::error!(error = %e, "Reminder tick aborted: could not list reminders"),
        }
    }
}

impl<S, M> ReminderScheduler<S, M>
where
    S: RecordStore + 'static,
    M: Mailer + 'static,
{
    /// Run a tick every `every` until `shutdown` flips to `true` or its sender drops.
    ///
    /// The first tick runs immediately. A tick always finishes before the
    /// next one starts; ticks missed meanwhile are skipped.
    pub fn spawn(self: Arc<Self>, every: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(interval_secs = every.as_secs(), "Reminder scheduler started");

            loop {
                tokio::select! {
                    _ = interval.tick() => self.run_tick().await,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("Reminder scheduler stopped");
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::Ordering;

    use chrono::TimeZone;
    use serde_json::Value;

    use super::*;
    use crate::services::notify::fakes::RecordingMailer;
    use crate::store::memory::MemoryStore;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    fn record(id: &str, fields: Value) -> Record {
        Record {
            id: id.to_string(),
            fields: fields.as_object().cloned().unwrap(),
            ..Record::default()
        }
    }

    fn pending(topic: &str, datetime: &str, email: &str) -> Value {
        json!({
            "topic": topic,
            "description": "call back",
            "datetime": datetime,
            "email": email,
            "sent": false,
        })
    }

    fn scheduler(
        store: &Arc<MemoryStore>,
        mailer: RecordingMailer,
    ) -> ReminderScheduler<Arc<MemoryStore>, RecordingMailer> {
        ReminderScheduler::new(Arc::clone(store), mailer, 3)
    }

    #[test]
    fn test_partition_due() {
        let records = vec![
            record("past", pending("a", "2025-03-10 11:00:00.000Z", "a@rbl.test")),
            record("exact", pending("b", "2025-03-10T12:00", "b@rbl.test")),
            record("future", pending("c", "2025-03-10T12:01", "c@rbl.test")),
            record(
                "sent",
                json!({ "datetime": "2025-03-01T00:00", "email": "d@rbl.test", "sent": true }),
            ),
            record(
                "failed",
                json!({ "datetime": "2025-03-01T00:00", "email": "e@rbl.test", "failed": true }),
            ),
        ];

        let partition = partition_due(&records, now());
        let due: Vec<_> = partition.due.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(due, vec!["past", "exact"]);
        assert_eq!(partition.upcoming, 1);
        assert_eq!(partition.settled, 2);
        assert!(partition.skipped.is_empty());
    }

    #[test]
    fn test_partition_reports_skipped() {
        let records = vec![
            record("no-time", json!({ "email": "a@rbl.test" })),
            record("bad-time", pending("t", "next tuesday", "a@rbl.test")),
            record("no-email", json!({ "datetime": "2025-03-01T00:00" })),
            record("bad-email", pending("t", "2025-03-01T00:00", "not-an-email")),
        ];

        let partition = partition_due(&records, now());
        assert!(partition.due.is_empty());
        let reasons: Vec<_> = partition.skipped.iter().map(|s| s.reason.clone()).collect();
        assert_eq!(
            reasons,
            vec![
                SkipReason::MissingSchedule,
                SkipReason::UnparsableSchedule("next tuesday".to_string()),
                SkipReason::MissingRecipient,
                SkipReason::InvalidRecipient("not-an-email".to_string()),
            ]
        );
    }

    #[test]
    fn test_partition_is_idempotent() {
        let records = vec![
            record("a", pending("a", "2025-03-10T09:00", "a@rbl.test")),
            record("b", pending("b", "2025-03-11T09:00", "b@rbl.test")),
        ];
        let first = partition_due(&records, now());
        let second = partition_due(&records, now());
        assert_eq!(first.due, second.due);
        assert_eq!(first.upcoming, second.upcoming);
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(
            SkipReason::UnparsableSchedule("soon".to_string()).to_string(),
            "unparsable scheduled time \"soon\""
        );
        assert_eq!(SkipReason::MissingRecipient.to_string(), "no recipient address");
        assert!(SkipReason::InvalidRecipient("x".to_string()).is_undeliverable());
        assert!(!SkipReason::MissingSchedule.is_undeliverable());
    }

    #[tokio::test]
    async fn test_tick_marks_sent_and_is_not_due_again() {
        let store = Arc::new(MemoryStore::new());
        let id = store.seed(REMINDERS, pending("Pay supplier", "2025-03-10T08:00", "ops@rbl.test"));
        let scheduler = scheduler(&store, RecordingMailer::default());

        let report = scheduler.tick(now()).await.unwrap();
        assert_eq!(report.due, 1);
        assert_eq!(report.dispatched, 1);
        assert!(store.record(REMINDERS, &id).unwrap().bool_field("sent"));
        assert_eq!(scheduler.dispatcher_sent(), 1);

        let report = scheduler.tick(now()).await.unwrap();
        assert_eq!(report.due, 0);
        assert_eq!(scheduler.dispatcher_sent(), 1);
    }

    #[tokio::test]
    async fn test_tick_one_failure_does_not_block_others() {
        let store = Arc::new(MemoryStore::new());
        let a = store.seed(REMINDERS, pending("a", "2025-03-10T08:00", "a@rbl.test"));
        let b = store.seed(REMINDERS, pending("b", "2025-03-10T09:00", "bad@rbl.test"));
        let c = store.seed(REMINDERS, pending("c", "2025-03-10T10:00", "c@rbl.test"));
        let scheduler = scheduler(&store, RecordingMailer::failing_for(&["bad@rbl.test"]));

        let report = scheduler.tick(now()).await.unwrap();
        assert_eq!(report.dispatched, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.dead_lettered, 0);

        assert!(store.record(REMINDERS, &a).unwrap().bool_field("sent"));
        assert!(store.record(REMINDERS, &c).unwrap().bool_field("sent"));
        let failing = store.record(REMINDERS, &b).unwrap();
        assert!(!failing.bool_field("sent"));
        assert!(!failing.bool_field("failed"));
        assert_eq!(failing.u32_field("attempts"), 1);
    }

    #[tokio::test]
    async fn test_tick_dead_letters_at_attempt_cap() {
        let store = Arc::new(MemoryStore::new());
        let id = store.seed(REMINDERS, pending("x", "2025-03-10T08:00", "bad@rbl.test"));
        let scheduler = scheduler(&store, RecordingMailer::failing_for(&["bad@rbl.test"]));

        for _ in 0..2 {
            let report = scheduler.tick(now()).await.unwrap();
            assert_eq!(report.failed, 1);
        }
        let report = scheduler.tick(now()).await.unwrap();
        assert_eq!(report.dead_lettered, 1);

        let record = store.record(REMINDERS, &id).unwrap();
        assert!(record.bool_field("failed"));
        assert_eq!(record.u32_field("attempts"), 3);

        let report = scheduler.tick(now()).await.unwrap();
        assert_eq!(report.due, 0);
    }

    #[tokio::test]
    async fn test_tick_counts_write_back_errors() {
        let store = Arc::new(MemoryStore::new());
        let id = store.seed(REMINDERS, pending("x", "2025-03-10T08:00", "ops@rbl.test"));
        store
            .fail_updates_for
            .lock()
            .unwrap()
            .insert(id.clone());
        let scheduler = scheduler(&store, RecordingMailer::default());

        let report = scheduler.tick(now()).await.unwrap();
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.write_back_errors, 1);
        // Still pending, so the next tick sends again.
        assert!(!store.record(REMINDERS, &id).unwrap().bool_field("sent"));
    }

    #[tokio::test]
    async fn test_tick_list_failure_sends_nothing() {
        let store = Arc::new(MemoryStore::new());
        store.seed(REMINDERS, pending("x", "2025-03-10T08:00", "ops@rbl.test"));
        store.fail_list.store(true, Ordering::SeqCst);
        let scheduler = scheduler(&store, RecordingMailer::default());

        assert!(scheduler.tick(now()).await.is_err());
        assert_eq!(scheduler.dispatcher_sent(), 0);
        assert!(store.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tick_skips_unparsable_without_error() {
        let store = Arc::new(MemoryStore::new());
        store.seed(REMINDERS, pending("x", "whenever", "ops@rbl.test"));
        let scheduler = scheduler(&store, RecordingMailer::default());

        let report = scheduler.tick(now()).await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.due, 0);
    }

    #[tokio::test]
    async fn test_tick_dead_letters_bad_recipient_once() {
        let store = Arc::new(MemoryStore::new());
        let bad = store.seed(REMINDERS, pending("x", "2025-03-10T08:00", "not-an-email"));
        let missing = store.seed(
            REMINDERS,
            json!({ "topic": "y", "datetime": "2025-03-10T08:00", "sent": false }),
        );
        let scheduler = scheduler(&store, RecordingMailer::default());

        let report = scheduler.tick(now()).await.unwrap();
        assert_eq!(report.skipped, 2);
        assert_eq!(report.dead_lettered, 2);
        assert_eq!(scheduler.dispatcher_sent(), 0);
        assert!(store.record(REMINDERS, &bad).unwrap().bool_field("failed"));
        assert!(store.record(REMINDERS, &missing).unwrap().bool_field("failed"));

        let report = scheduler.tick(now()).await.unwrap();
        assert_eq!(report.skipped, 0);
        assert_eq!(report.dead_lettered, 0);
    }

    #[tokio::test]
    async fn test_spawn_stops_on_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Arc::new(scheduler(&store, RecordingMailer::default()));
        let (tx, rx) = watch::channel(false);

        let handle = scheduler.spawn(Duration::from_secs(3600), rx);
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    impl ReminderScheduler<Arc<MemoryStore>, RecordingMailer> {
        fn dispatcher_sent(&self) -> usize {
            self.dispatcher.mailer().sent().len()
        }
    }
}

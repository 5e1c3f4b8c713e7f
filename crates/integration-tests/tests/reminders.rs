//! Reminder scheduler ticks against the fake store.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use rbl_admin::services::ReminderScheduler;
use rbl_admin::store::RecordStoreClient;
use rbl_integration_tests::{FakeRecordStore, RecordingMailer};
use serde_json::json;
use tokio::sync::watch;

async fn client(fake: &FakeRecordStore) -> RecordStoreClient {
    let client = fake.client();
    client.authenticate().await.unwrap();
    client
}

fn reminder(fake: &FakeRecordStore, topic: &str, datetime: &str, email: &str) -> String {
    fake.insert(
        "reminders",
        json!({
            "topic": topic,
            "description": "Check the shipment",
            "datetime": datetime,
            "email": email,
            "sent": false,
            "failed": false,
            "attempts": 0,
        }),
    )
}

#[tokio::test]
async fn test_tick_sends_due_and_records_outcome() {
    let fake = FakeRecordStore::start().await;
    let due = reminder(&fake, "Call Ilam", "2025-03-10T09:00", "ops@rblsourcing.com");
    let bounced = reminder(&fake, "Pay Everest", "2025-03-10T10:00", "gone@rblsourcing.com");
    let later = reminder(&fake, "Ship tea", "2025-03-11T09:00", "ops@rblsourcing.com");
    let broken = reminder(&fake, "Broken", "soon", "ops@rblsourcing.com");

    let mailer = RecordingMailer::rejecting(&["gone@rblsourcing.com"]);
    let scheduler = ReminderScheduler::new(client(&fake).await, mailer, 3);
    let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();

    let report = scheduler.tick(now).await.unwrap();

    assert_eq!(report.scanned, 4);
    assert_eq!(report.due, 2);
    assert_eq!(report.dispatched, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.write_back_errors, 0);

    let sent = fake.record("reminders", &due).unwrap();
    assert_eq!(sent["sent"], true);
    let retry = fake.record("reminders", &bounced).unwrap();
    assert_eq!(retry["sent"], false);
    assert_eq!(retry["attempts"], 1);
    assert_eq!(retry["failed"], false);
    assert_eq!(fake.record("reminders", &later).unwrap()["sent"], false);
    assert_eq!(fake.record("reminders", &broken).unwrap()["attempts"], 0);

    // Nothing is delivered twice.
    let again = scheduler.tick(now).await.unwrap();
    assert_eq!(again.dispatched, 0);
    assert_eq!(again.failed, 1);
}

#[tokio::test]
async fn test_undeliverable_recipient_is_dead_lettered() {
    let fake = FakeRecordStore::start().await;
    let id = reminder(&fake, "Call Ilam", "2025-03-10T09:00", "ops at rbl");

    let scheduler = ReminderScheduler::new(client(&fake).await, RecordingMailer::new(), 3);
    let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();

    let report = scheduler.tick(now).await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.dead_lettered, 1);
    let record = fake.record("reminders", &id).unwrap();
    assert_eq!(record["failed"], true);
    assert_eq!(record["sent"], false);

    let again = scheduler.tick(now).await.unwrap();
    assert_eq!(again.skipped, 0);
    assert_eq!(again.dead_lettered, 0);
}

#[tokio::test]
async fn test_store_outage_ends_tick() {
    let fake = FakeRecordStore::start().await;
    reminder(&fake, "Call Ilam", "2025-03-10T09:00", "ops@rblsourcing.com");
    fake.fail("reminders");

    let scheduler = ReminderScheduler::new(client(&fake).await, RecordingMailer::new(), 3);
    let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();

    let error = scheduler.tick(now).await.unwrap_err();
    assert!(error.is_unavailable());
}

#[tokio::test]
async fn test_spawned_scheduler_delivers_and_stops() {
    let fake = FakeRecordStore::start().await;
    let id = reminder(&fake, "Call Ilam", "2020-01-01T00:00", "ops@rblsourcing.com");

    let scheduler = Arc::new(ReminderScheduler::new(
        client(&fake).await,
        RecordingMailer::new(),
        3,
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = Arc::clone(&scheduler).spawn(Duration::from_secs(3600), shutdown_rx);

    // The first tick runs immediately.
    let mut delivered = false;
    for _ in 0..50 {
        if fake.record("reminders", &id).unwrap()["sent"] == true {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(delivered);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}

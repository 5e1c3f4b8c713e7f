//! Business identifier generation over the REST client.

#![allow(clippy::unwrap_used)]

use rbl_admin::services::{IdError, IdGenerator};
use rbl_admin::store::RecordStoreClient;
use rbl_core::SequenceKind;
use rbl_integration_tests::FakeRecordStore;
use serde_json::{Map, json};

async fn generator(fake: &FakeRecordStore) -> IdGenerator<RecordStoreClient> {
    let client = fake.client();
    client.authenticate().await.unwrap();
    IdGenerator::new(client, Some(2025))
}

fn fields(name: &str) -> Map<String, serde_json::Value> {
    let mut fields = Map::new();
    fields.insert("name".to_string(), json!(name));
    fields
}

#[tokio::test]
async fn test_next_id_skips_other_years_and_malformed() {
    let fake = FakeRecordStore::start().await;
    fake.insert("customers", json!({ "customer_id": "CUST_2025_0007" }));
    fake.insert("customers", json!({ "customer_id": "CUST_2025_00x9" }));
    fake.insert("customers", json!({ "customer_id": "CUST_2024_0042" }));
    fake.insert("products", json!({ "product_id": "PROD_2025_0100" }));

    let ids = generator(&fake).await;

    assert_eq!(
        ids.next_id(SequenceKind::Customer).await.unwrap().to_string(),
        "CUST_2025_0008"
    );
    assert_eq!(
        ids.next_id(SequenceKind::Product).await.unwrap().to_string(),
        "PROD_2025_0101"
    );
}

#[tokio::test]
async fn test_sequential_creates_never_repeat() {
    let fake = FakeRecordStore::start().await;
    fake.unique("customers", "customer_id");
    let ids = generator(&fake).await;

    for name in ["Everest Traders", "Ilam Estates", "Pokhara Foods"] {
        ids.create_sequenced(SequenceKind::Customer, fields(name))
            .await
            .unwrap();
    }

    let assigned: Vec<String> = fake
        .records("customers")
        .iter()
        .map(|r| r["customer_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(assigned, ["CUST_2025_0001", "CUST_2025_0002", "CUST_2025_0003"]);
}

#[tokio::test]
async fn test_conflict_from_another_writer_is_retried() {
    let fake = FakeRecordStore::start().await;
    fake.unique("customers", "customer_id");
    fake.insert("customers", json!({ "customer_id": "CUST_2025_0001" }));
    // Another process takes 0002 between our scan and our create.
    fake.insert_before_next_create("customers", json!({ "customer_id": "CUST_2025_0002" }));
    let ids = generator(&fake).await;

    let (id, record) = ids
        .create_sequenced(SequenceKind::Customer, fields("Everest Traders"))
        .await
        .unwrap();

    assert_eq!(id.to_string(), "CUST_2025_0003");
    assert_eq!(record.text("customer_id"), "CUST_2025_0003");
    assert_eq!(fake.records("customers").len(), 3);
}

#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    let fake = FakeRecordStore::start().await;
    fake.unique("products", "product_id");
    for taken in ["PROD_2025_0001", "PROD_2025_0002"] {
        fake.insert_before_next_create("products", json!({ "product_id": taken }));
    }
    let ids = generator(&fake).await.with_max_attempts(2);

    let result = ids
        .create_sequenced(SequenceKind::Product, fields("Green Tea"))
        .await;

    assert!(matches!(
        result,
        Err(IdError::Exhausted { kind: SequenceKind::Product, attempts: 2 })
    ));
}

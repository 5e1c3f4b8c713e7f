//! In-memory record store for service tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use super::{ListQuery, Page, Record, RecordStore, StoreError};

/// Fields with a unique index, as the real schema declares them.
const UNIQUE_FIELDS: &[&str] = &["product_id", "customer_id"];

#[derive(Default)]
pub(crate) struct MemoryStore {
    collections: Mutex<BTreeMap<String, Vec<Record>>>,
    next_id: AtomicUsize,
    /// Record inserted right before the next create, simulating a concurrent writer.
    race: Mutex<Option<(String, Record)>>,
    pub fail_list: AtomicBool,
    pub fail_updates_for: Mutex<HashSet<String>>,
    pub creates: AtomicUsize,
    pub updates: Mutex<Vec<(String, Value)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record with the given fields and return its id.
    pub fn seed(&self, collection: &str, fields: Value) -> String {
        let record = self.build(fields);
        let id = record.id.clone();
        self.lock()
            .entry(collection.to_string())
            .or_default()
            .push(record);
        id
    }

    pub fn race_next_create(&self, collection: &str, fields: Value) {
        let record = self.build(fields);
        *self.race.lock().unwrap_or_else(std::sync::PoisonError::into_inner) =
            Some((collection.to_string(), record));
    }

    pub fn records(&self, collection: &str) -> Vec<Record> {
        self.lock().get(collection).cloned().unwrap_or_default()
    }

    pub fn record(&self, collection: &str, id: &str) -> Option<Record> {
        self.records(collection).into_iter().find(|r| r.id == id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<Record>>> {
        self.collections
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn build(&self, fields: Value) -> Record {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let Value::Object(fields) = fields else {
            panic!("seed fields must be an object");
        };
        Record {
            id: format!("rec{n:05}"),
            collection_name: None,
            created: Some(format!("2025-01-01 00:00:{:02}.000Z", n % 60)),
            updated: None,
            fields,
        }
    }
}

/// Minimal filter support: a single `field = "v"` or `field ~ "v"` clause.
fn matches_filter(record: &Record, filter: Option<&str>) -> bool {
    let Some(filter) = filter else {
        return true;
    };
    if filter.contains("&&") || filter.contains("||") {
        return true;
    }
    let mut parts = filter.splitn(3, ' ');
    let (Some(field), Some(op), Some(value)) = (parts.next(), parts.next(), parts.next()) else {
        return true;
    };
    let value = value.trim_matches('"');
    let actual = record
        .get(field)
        .map(|v| v.as_str().map_or_else(|| v.to_string(), String::from))
        .unwrap_or_default();
    match op {
        "=" => actual == value,
        "~" => actual.to_lowercase().contains(&value.to_lowercase()),
        _ => true,
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list(&self, collection: &str, query: &ListQuery) -> Result<Page, StoreError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(StoreError::Api {
                status: 503,
                message: "store unavailable".to_string(),
            });
        }

        let mut matching: Vec<Record> = self
            .records(collection)
            .into_iter()
            .filter(|r| matches_filter(r, query.filter.as_deref()))
            .collect();
        if query.sort.as_deref() == Some("-created") {
            matching.reverse();
        }

        let per_page = query.per_page.max(1) as usize;
        let total_items = matching.len();
        let total_pages = total_items.div_ceil(per_page).max(1);
        let items = matching
            .into_iter()
            .skip((query.page.max(1) as usize - 1) * per_page)
            .take(per_page)
            .collect();

        Ok(Page {
            page: query.page,
            per_page: query.per_page,
            total_items: total_items as u64,
            total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
            items,
        })
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Record, StoreError> {
        self.record(collection, id)
            .ok_or_else(|| StoreError::NotFound(format!("{collection}/{id}")))
    }

    async fn create(&self, collection: &str, fields: &Value) -> Result<Record, StoreError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let raced = self
            .race
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some((raced_collection, record)) = raced {
            self.lock().entry(raced_collection).or_default().push(record);
        }

        let record = self.build(fields.clone());
        let mut collections = self.lock();
        let existing = collections.entry(collection.to_string()).or_default();
        for field in UNIQUE_FIELDS {
            if let Some(value) = record.str_field(field)
                && existing.iter().any(|r| r.str_field(field) == Some(value))
            {
                return Err(StoreError::Conflict {
                    field: (*field).to_string(),
                });
            }
        }
        existing.push(record.clone());
        Ok(record)
    }

    async fn update(&self, collection: &str, id: &str, fields: &Value) -> Result<Record, StoreError> {
        if self
            .fail_updates_for
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains(id)
        {
            return Err(StoreError::Api {
                status: 500,
                message: "update failed".to_string(),
            });
        }
        self.updates
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((id.to_string(), fields.clone()));

        let mut collections = self.lock();
        let record = collections
            .get_mut(collection)
            .and_then(|records| records.iter_mut().find(|r| r.id == id))
            .ok_or_else(|| StoreError::NotFound(format!("{collection}/{id}")))?;
        if let Value::Object(patch) = fields {
            for (key, value) in patch {
                record.fields.insert(key.clone(), value.clone());
            }
        }
        Ok(record.clone())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut collections = self.lock();
        let records = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::NotFound(format!("{collection}/{id}")))?;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Err(StoreError::NotFound(format!("{collection}/{id}")));
        }
        Ok(())
    }
}

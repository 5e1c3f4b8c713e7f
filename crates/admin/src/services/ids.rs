//! Sequential business identifier generation.
//!
//! The next identifier is derived from the highest sequence already stored
//! for the same prefix and year. Generation plus creation is serialized per
//! entity kind inside this process; across processes the store's unique index
//! rejects duplicates and the create is retried with a fresh identifier.

use std::future::Future;

use chrono::{Datelike, Utc};
use rbl_core::{BusinessId, SequenceKind};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::store::{FULL_LIST_PAGE_SIZE, Filter, ListQuery, Record, RecordStore, StoreError};

/// Creates attempted before giving up on uniqueness conflicts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Errors that can occur when generating or assigning identifiers.
#[derive(Debug, Error)]
pub enum IdError {
    /// Existing identifiers could not be listed, or the create failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Every attempt collided with an identifier created concurrently.
    #[error("Could not assign a unique {kind} id after {attempts} attempts")]
    Exhausted { kind: SequenceKind, attempts: u32 },
}

/// Identifier generator over a record store.
pub struct IdGenerator<S> {
    store: S,
    year: Option<i32>,
    max_attempts: u32,
    product_lock: Mutex<()>,
    customer_lock: Mutex<()>,
}

impl<S: RecordStore> IdGenerator<S> {
    /// Create a generator. `year` pins the year part; `None` uses the current UTC year.
    pub fn new(store: S, year: Option<i32>) -> Self {
        Self {
            store,
            year,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            product_lock: Mutex::new(()),
            customer_lock: Mutex::new(()),
        }
    }

    /// Override the number of create attempts (at least 1).
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Year used for new identifiers.
    #[must_use]
    pub fn year(&self) -> i32 {
        self.year.unwrap_or_else(|| Utc::now().year())
    }

    /// Compute the next identifier for `kind` without reserving it.
    ///
    /// # Errors
    ///
    /// Returns `IdError::Store` if existing records cannot be listed.
    #[instrument(skip(self))]
    pub async fn next_id(&self, kind: SequenceKind) -> Result<BusinessId, IdError> {
        let year = self.year();
        let prefix = kind.year_prefix(year);
        let query = ListQuery::new()
            .filter(Filter::like(kind.field(), &prefix))
            .per_page(FULL_LIST_PAGE_SIZE);
        let records = self.store.list_all(kind.collection(), &query).await?;

        let scan = BusinessId::scan(
            kind,
            year,
            records.iter().filter_map(|r| r.str_field(kind.field())),
        );
        for malformed in &scan.malformed {
            tracing::warn!(
                kind = %kind,
                business_id = %malformed,
                "Skipping business id with non-numeric sequence"
            );
        }
        tracing::debug!(
            matched = scan.matched,
            max_seen = scan.max_seen,
            next = %scan.next,
            "Computed next business id"
        );

        Ok(scan.next)
    }

    /// Create a record of `kind` with a freshly generated identifier.
    ///
    /// # Errors
    ///
    /// Returns `IdError::Exhausted` if every attempt hit a uniqueness
    /// conflict, or `IdError::Store` for any other store failure.
    pub async fn create_sequenced(
        &self,
        kind: SequenceKind,
        fields: Map<String, Value>,
    ) -> Result<(BusinessId, Record), IdError> {
        self.create_sequenced_with(kind, |id| {
            let mut fields = fields.clone();
            fields.insert(kind.field().to_string(), Value::String(id.to_string()));
            async move { self.store.create(kind.collection(), &Value::Object(fields)).await }
        })
        .await
    }

    /// Like [`IdGenerator::create_sequenced`], with a caller-supplied create step.
    ///
    /// `create` receives each candidate identifier and must store it in the
    /// kind's identifier field; used for multipart creates with attachments.
    ///
    /// # Errors
    ///
    /// See [`IdGenerator::create_sequenced`].
    #[instrument(skip(self, create))]
    pub async fn create_sequenced_with<F, Fut>(
        &self,
        kind: SequenceKind,
        mut create: F,
    ) -> Result<(BusinessId, Record), IdError>
    where
        F: FnMut(BusinessId) -> Fut + Send,
        Fut: Future<Output = Result<Record, StoreError>> + Send,
    {
        let _guard = self.lock_for(kind).lock().await;

        for attempt in 1..=self.max_attempts {
            let id = self.next_id(kind).await?;
            match create(id).await {
                Ok(record) => {
                    tracing::info!(business_id = %id, record_id = %record.id, "Created sequenced record");
                    return Ok((id, record));
                }
                Err(e) if e.is_conflict_on(kind.field()) => {
                    tracing::warn!(
                        business_id = %id,
                        attempt,
                        "Business id taken by a concurrent writer, regenerating"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(IdError::Exhausted {
            kind,
            attempts: self.max_attempts,
        })
    }

    const fn lock_for(&self, kind: SequenceKind) -> &Mutex<()> {
        match kind {
            SequenceKind::Product => &self.product_lock,
            SequenceKind::Customer => &self.customer_lock,
        }
    }
}

//! Record store access.
//!
//! The record store (a PocketBase-style backend) owns every persisted record
//! and staff credential. This module is a thin pass-through over its REST API:
//! no caching, errors surface to the caller.
//!
//! Services depend on the [`RecordStore`] trait rather than the concrete
//! [`RecordStoreClient`] so they can run against an in-memory store in tests.

mod auth;
mod client;
mod error;
mod filter;
#[cfg(test)]
pub(crate) mod memory;
mod types;

pub use auth::USERS_COLLECTION;
pub use client::{RecordStoreClient, file_url};
pub use error::{NOT_UNIQUE_CODE, StoreError};
pub use filter::Filter;
pub use types::{
    ApiErrorBody, AuthenticatedUser, FULL_LIST_PAGE_SIZE, FileUpload, ListQuery, Page, Record,
};

use async_trait::async_trait;
use serde_json::Value;

/// Collection names.
pub mod collections {
    pub const CUSTOMERS: &str = "customers";
    pub const PRODUCTS: &str = "products";
    pub const SUPPLIERS: &str = "suppliers";
    pub const INQUIRIES: &str = "inquiries";
    pub const REMINDERS: &str = "reminders";
}

/// Collection-level record operations.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch one page of records.
    async fn list(&self, collection: &str, query: &ListQuery) -> Result<Page, StoreError>;

    /// Fetch one record by id.
    async fn get(&self, collection: &str, id: &str) -> Result<Record, StoreError>;

    /// Create a record from a JSON object.
    async fn create(&self, collection: &str, fields: &Value) -> Result<Record, StoreError>;

    /// Partially update a record.
    async fn update(&self, collection: &str, id: &str, fields: &Value)
    -> Result<Record, StoreError>;

    /// Delete a record.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Fetch every record matching `query`, paging until the last page.
    ///
    /// `query.page` is ignored; `query.per_page` sets the batch size.
    async fn list_all(&self, collection: &str, query: &ListQuery) -> Result<Vec<Record>, StoreError> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let batch = self
                .list(collection, &query.clone().page(page))
                .await?;
            let done = batch.items.is_empty() || page >= batch.total_pages;
            items.extend(batch.items);
            if done {
                return Ok(items);
            }
            page += 1;
        }
    }
}

#[async_trait]
impl<T: RecordStore + ?Sized> RecordStore for std::sync::Arc<T> {
    async fn list(&self, collection: &str, query: &ListQuery) -> Result<Page, StoreError> {
        (**self).list(collection, query).await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Record, StoreError> {
        (**self).get(collection, id).await
    }

    async fn create(&self, collection: &str, fields: &Value) -> Result<Record, StoreError> {
        (**self).create(collection, fields).await
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: &Value,
    ) -> Result<Record, StoreError> {
        (**self).update(collection, id, fields).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        (**self).delete(collection, id).await
    }

    async fn list_all(&self, collection: &str, query: &ListQuery) -> Result<Vec<Record>, StoreError> {
        (**self).list_all(collection, query).await
    }
}

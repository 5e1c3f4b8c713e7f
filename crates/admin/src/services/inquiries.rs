//! Inquiry listing, search and numbering.
//!
//! Search spans the inquiry and its customer and product, so matching runs
//! here over full lists rather than as a store filter.

use std::collections::HashMap;

use rbl_core::{InquiryNumber, InquiryStatus};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::instrument;

use crate::store::collections::{CUSTOMERS, INQUIRIES, PRODUCTS};
use crate::store::{FULL_LIST_PAGE_SIZE, Filter, ListQuery, Record, RecordStore, StoreError};

/// Default inquiries per page.
pub const INQUIRIES_PER_PAGE: u32 = 7;

const UNKNOWN: &str = "Unknown";

/// Listing parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InquiryQuery {
    pub page: Option<u32>,
    #[serde(rename = "perPage")]
    pub per_page: Option<u32>,
    pub customer_id: Option<String>,
    pub search: Option<String>,
}

/// An inquiry row with resolved customer and product names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InquiryRow {
    pub id: String,
    pub inquiry_no: String,
    pub customer_id: String,
    pub customer_name: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: Value,
    pub amount: Value,
    pub remarks: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InquiryStats {
    pub total: usize,
    pub active: usize,
    pub closed: usize,
}

/// One page of inquiries plus stats over the whole matching set.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InquiryListing {
    pub items: Vec<InquiryRow>,
    pub total_items: usize,
    pub total_pages: usize,
    pub current_page: u32,
    pub per_page: u32,
    pub stats: InquiryStats,
}

/// Fields accepted when creating or editing an inquiry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InquiryInput {
    pub customer_id: Option<String>,
    pub product_id: Option<String>,
    pub quantity: Option<u32>,
    pub amount: Option<Value>,
    pub remarks: Option<String>,
    pub status: Option<InquiryStatus>,
}

/// True if `term` (lowercase) occurs in any searchable field.
#[must_use]
pub fn matches_search(
    inquiry: &Record,
    customer: Option<&Record>,
    product: Option<&Record>,
    term: &str,
) -> bool {
    let mut haystack: Vec<String> = ["inquiry_no", "status", "remarks", "quantity", "amount"]
        .iter()
        .map(|f| field_text(inquiry, f))
        .collect();
    if let Some(customer) = customer {
        haystack.extend(
            ["name", "email", "phone", "customer_id"]
                .iter()
                .map(|f| field_text(customer, f)),
        );
    }
    if let Some(product) = product {
        haystack.extend(
            ["name", "category", "brand"]
                .iter()
                .map(|f| field_text(product, f)),
        );
    }
    haystack.iter().any(|field| field.to_lowercase().contains(term))
}

/// Stats over a set of inquiries. Anything not `Closed` counts as active.
#[must_use]
pub fn stats(inquiries: &[Record]) -> InquiryStats {
    let closed = inquiries
        .iter()
        .filter(|i| i.str_field("status") == Some(InquiryStatus::Closed.label()))
        .count();
    InquiryStats {
        total: inquiries.len(),
        active: inquiries.len() - closed,
        closed,
    }
}

/// Total pages for `total` items, never less than 1.
#[must_use]
pub const fn total_pages(total: usize, per_page: u32) -> usize {
    let per_page = if per_page == 0 { 1 } else { per_page as usize };
    if total == 0 { 1 } else { total.div_ceil(per_page) }
}

/// List inquiries newest first, optionally for one customer and matching a search term.
///
/// # Errors
///
/// Returns the store error if inquiries, customers or products cannot be listed.
#[instrument(skip(store))]
pub async fn list<S: RecordStore>(
    store: &S,
    query: &InquiryQuery,
) -> Result<InquiryListing, StoreError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(INQUIRIES_PER_PAGE).max(1);
    let customer_filter = query
        .customer_id
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|c| Filter::eq("customer_id", c));
    let term = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    let list_query = ListQuery::new()
        .maybe_filter(customer_filter)
        .sort("-created")
        .per_page(FULL_LIST_PAGE_SIZE);
    let all_query = ListQuery::new().per_page(FULL_LIST_PAGE_SIZE);
    let (inquiries, customers, products) = tokio::try_join!(
        store.list_all(INQUIRIES, &list_query),
        store.list_all(CUSTOMERS, &all_query),
        store.list_all(PRODUCTS, &all_query),
    )?;

    let customers: HashMap<&str, &Record> = customers.iter().map(|c| (c.id.as_str(), c)).collect();
    let products: HashMap<&str, &Record> = products.iter().map(|p| (p.id.as_str(), p)).collect();
    let related = |inquiry: &Record| {
        (
            inquiry
                .str_field("customer_id")
                .and_then(|id| customers.get(id).copied()),
            inquiry
                .str_field("product_id")
                .and_then(|id| products.get(id).copied()),
        )
    };

    let matching: Vec<Record> = match &term {
        Some(term) => inquiries
            .into_iter()
            .filter(|inquiry| {
                let (customer, product) = related(inquiry);
                matches_search(inquiry, customer, product, term)
            })
            .collect(),
        None => inquiries,
    };

    let skip = (page as usize - 1).saturating_mul(per_page as usize);
    let items = matching
        .iter()
        .skip(skip)
        .take(per_page as usize)
        .map(|inquiry| {
            let (customer, product) = related(inquiry);
            row(inquiry, customer, product)
        })
        .collect();

    Ok(InquiryListing {
        items,
        total_items: matching.len(),
        total_pages: total_pages(matching.len(), per_page),
        current_page: page,
        per_page,
        stats: stats(&matching),
    })
}

/// Create an inquiry for an existing customer and product.
///
/// # Errors
///
/// Returns `StoreError::NotFound` if the customer or product does not exist,
/// or any store error from the create.
#[instrument(skip(store, input))]
pub async fn create<S: RecordStore>(
    store: &S,
    year: i32,
    customer_id: &str,
    product_id: &str,
    input: InquiryInput,
) -> Result<Record, StoreError> {
    let (customer, product) = tokio::try_join!(
        store.get(CUSTOMERS, customer_id),
        store.get(PRODUCTS, product_id),
    )?;
    let number = InquiryNumber::compose(
        year,
        customer.str_field("customer_id"),
        product.str_field("product_id"),
    );

    let fields = json!({
        "inquiry_no": number,
        "customer_id": customer_id,
        "product_id": product_id,
        "quantity": input.quantity.unwrap_or(1),
        "amount": input.amount.unwrap_or_else(|| Value::String(String::new())),
        "remarks": input.remarks.unwrap_or_default(),
        "status": input.status.unwrap_or_default(),
    });
    let record = store.create(INQUIRIES, &fields).await?;
    tracing::info!(inquiry_no = %number, record_id = %record.id, "Created inquiry");
    Ok(record)
}

/// Edit an inquiry, keeping stored values for absent fields and recomputing its number.
///
/// # Errors
///
/// Returns `StoreError::NotFound` if the inquiry does not exist, or any
/// store error from the update. A missing customer or product falls back to
/// a `{customer}-{product}` number instead of failing.
#[instrument(skip(store, input))]
pub async fn update<S: RecordStore>(
    store: &S,
    year: i32,
    id: &str,
    input: InquiryInput,
) -> Result<Record, StoreError> {
    let existing = store.get(INQUIRIES, id).await?;

    let customer_id = input
        .customer_id
        .unwrap_or_else(|| existing.text("customer_id").to_string());
    let product_id = input
        .product_id
        .unwrap_or_else(|| existing.text("product_id").to_string());

    let number = match tokio::try_join!(
        store.get(CUSTOMERS, &customer_id),
        store.get(PRODUCTS, &product_id),
    ) {
        Ok((customer, product)) => InquiryNumber::compose(
            year,
            customer.str_field("customer_id"),
            product.str_field("product_id"),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Could not load inquiry references, using fallback number");
            InquiryNumber::fallback(&customer_id, &product_id)
        }
    };

    let mut fields = Map::new();
    fields.insert("customer_id".into(), json!(customer_id));
    fields.insert("product_id".into(), json!(product_id));
    fields.insert(
        "quantity".into(),
        input
            .quantity
            .map_or_else(|| existing_or(&existing, "quantity", json!(1)), |q| json!(q)),
    );
    fields.insert(
        "amount".into(),
        input
            .amount
            .unwrap_or_else(|| existing_or(&existing, "amount", json!(""))),
    );
    fields.insert(
        "remarks".into(),
        json!(input.remarks.unwrap_or_else(|| existing.text("remarks").to_string())),
    );
    fields.insert(
        "status".into(),
        input.status.map_or_else(
            || existing_or(&existing, "status", json!(InquiryStatus::default())),
            |s| json!(s),
        ),
    );
    fields.insert("inquiry_no".into(), json!(number));

    store.update(INQUIRIES, id, &Value::Object(fields)).await
}

fn existing_or(record: &Record, field: &str, default: Value) -> Value {
    match record.get(field) {
        Some(Value::Null) | None => default,
        Some(value) => value.clone(),
    }
}

fn field_text(record: &Record, field: &str) -> String {
    match record.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn row(inquiry: &Record, customer: Option<&Record>, product: Option<&Record>) -> InquiryRow {
    let name = |record: Option<&Record>| {
        record
            .and_then(|r| r.str_field("name"))
            .unwrap_or(UNKNOWN)
            .to_string()
    };
    InquiryRow {
        id: inquiry.id.clone(),
        inquiry_no: inquiry.text("inquiry_no").to_string(),
        customer_id: inquiry.text("customer_id").to_string(),
        customer_name: name(customer),
        product_id: inquiry.text("product_id").to_string(),
        product_name: name(product),
        quantity: existing_or(inquiry, "quantity", json!("")),
        amount: existing_or(inquiry, "amount", json!("")),
        remarks: inquiry.text("remarks").to_string(),
        status: inquiry.text("status").to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::memory::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        everest: String,
        lumbini: String,
        tea: String,
        rice: String,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let everest = store.seed(
            CUSTOMERS,
            json!({ "customer_id": "CUST_2025_0011", "name": "Everest Traders", "email": "buy@everest.test" }),
        );
        let lumbini = store.seed(
            CUSTOMERS,
            json!({ "customer_id": "CUST_2025_0012", "name": "Lumbini Imports", "phone": "9841000000" }),
        );
        let tea = store.seed(
            PRODUCTS,
            json!({ "product_id": "PROD_2024_0042", "name": "Green Tea", "brand": "Ilam" }),
        );
        let rice = store.seed(PRODUCTS, json!({ "product_id": "legacy", "name": "Basmati Rice" }));
        Fixture {
            store,
            everest,
            lumbini,
            tea,
            rice,
        }
    }

    fn seed_inquiry(f: &Fixture, customer: &str, product: &str, status: &str, remarks: &str) -> String {
        f.store.seed(
            INQUIRIES,
            json!({
                "inquiry_no": "INQ",
                "customer_id": customer,
                "product_id": product,
                "quantity": 2,
                "status": status,
                "remarks": remarks,
            }),
        )
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 7), 1);
        assert_eq!(total_pages(7, 7), 1);
        assert_eq!(total_pages(8, 7), 2);
        assert_eq!(total_pages(3, 0), 3);
    }

    #[test]
    fn test_matches_search_related_fields() {
        let inquiry = Record {
            id: "i".to_string(),
            fields: json!({ "remarks": "Needs samples", "quantity": 250 })
                .as_object()
                .cloned()
                .unwrap(),
            ..Record::default()
        };
        let customer = Record {
            id: "c".to_string(),
            fields: json!({ "name": "Everest Traders" }).as_object().cloned().unwrap(),
            ..Record::default()
        };

        assert!(matches_search(&inquiry, None, None, "samples"));
        assert!(matches_search(&inquiry, None, None, "250"));
        assert!(matches_search(&inquiry, Some(&customer), None, "everest"));
        assert!(!matches_search(&inquiry, None, None, "everest"));
    }

    #[tokio::test]
    async fn test_list_search_pagination_and_stats() {
        let f = fixture();
        for n in 0..8 {
            seed_inquiry(&f, &f.everest, &f.tea, "Quoting", &format!("batch {n}"));
        }
        seed_inquiry(&f, &f.lumbini, &f.rice, "Closed", "done");

        let listing = list(&f.store, &InquiryQuery::default()).await.unwrap();
        assert_eq!(listing.total_items, 9);
        assert_eq!(listing.total_pages, 2);
        assert_eq!(listing.items.len(), 7);
        assert_eq!(listing.stats, InquiryStats { total: 9, active: 8, closed: 1 });
        // Newest first.
        assert_eq!(listing.items[0].customer_name, "Lumbini Imports");
        assert_eq!(listing.items[0].product_name, "Basmati Rice");

        let query = InquiryQuery {
            search: Some("  ILAM ".to_string()),
            page: Some(2),
            ..InquiryQuery::default()
        };
        let listing = list(&f.store, &query).await.unwrap();
        assert_eq!(listing.total_items, 8);
        assert_eq!(listing.items.len(), 1);
        assert_eq!(listing.current_page, 2);
        assert_eq!(listing.stats.closed, 0);
    }

    #[tokio::test]
    async fn test_list_filters_by_customer() {
        let f = fixture();
        seed_inquiry(&f, &f.everest, &f.tea, "Inquiry", "");
        seed_inquiry(&f, &f.lumbini, &f.tea, "Inquiry", "");

        let query = InquiryQuery {
            customer_id: Some(f.lumbini.clone()),
            ..InquiryQuery::default()
        };
        let listing = list(&f.store, &query).await.unwrap();
        assert_eq!(listing.total_items, 1);
        assert_eq!(listing.items[0].customer_id, f.lumbini);
    }

    #[tokio::test]
    async fn test_list_unknown_references() {
        let f = fixture();
        seed_inquiry(&f, "deleted", "gone", "Inquiry", "");
        let listing = list(&f.store, &InquiryQuery::default()).await.unwrap();
        assert_eq!(listing.items[0].customer_name, "Unknown");
        assert_eq!(listing.items[0].product_name, "Unknown");
    }

    #[tokio::test]
    async fn test_create_composes_number_and_defaults() {
        let f = fixture();
        let record = create(&f.store, 2025, &f.everest, &f.tea, InquiryInput::default())
            .await
            .unwrap();
        assert_eq!(record.str_field("inquiry_no"), Some("INQ-2025-0011-0042"));
        assert_eq!(record.u32_field("quantity"), 1);
        assert_eq!(record.str_field("status"), Some("Inquiry"));

        let record = create(&f.store, 2025, &f.lumbini, &f.rice, InquiryInput::default())
            .await
            .unwrap();
        assert_eq!(record.str_field("inquiry_no"), Some("INQ-2025-0012-0000"));
    }

    #[tokio::test]
    async fn test_create_missing_customer() {
        let f = fixture();
        let result = create(&f.store, 2025, "nope", &f.tea, InquiryInput::default()).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert!(f.store.records(INQUIRIES).is_empty());
    }

    #[tokio::test]
    async fn test_update_merges_and_recomputes_number() {
        let f = fixture();
        let id = seed_inquiry(&f, &f.everest, &f.tea, "Quoting", "keep me");

        let input = InquiryInput {
            customer_id: Some(f.lumbini.clone()),
            status: Some(InquiryStatus::InShipment),
            ..InquiryInput::default()
        };
        let record = update(&f.store, 2025, &id, input).await.unwrap();
        assert_eq!(record.str_field("inquiry_no"), Some("INQ-2025-0012-0042"));
        assert_eq!(record.str_field("status"), Some("In Shipment"));
        assert_eq!(record.str_field("remarks"), Some("keep me"));
        assert_eq!(record.u32_field("quantity"), 2);
    }

    #[tokio::test]
    async fn test_update_falls_back_when_reference_missing() {
        let f = fixture();
        let id = seed_inquiry(&f, "old-cust", &f.tea, "Inquiry", "");
        let record = update(&f.store, 2025, &id, InquiryInput::default()).await.unwrap();
        assert_eq!(
            record.str_field("inquiry_no"),
            Some(format!("old-cust-{}", f.tea).as_str())
        );
    }
}

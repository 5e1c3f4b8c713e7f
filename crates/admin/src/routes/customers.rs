//! Customer route handlers.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use chrono::{DateTime, Duration, Utc};
use rbl_core::{Email, SequenceKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::instrument;

use crate::{
    error::AppError,
    middleware::RequireStaff,
    services::inquiries::{self, InquiryListing, InquiryQuery},
    state::AppState,
    store::{
        FULL_LIST_PAGE_SIZE, Filter, ListQuery, Record, RecordStore, StoreError,
        collections::{CUSTOMERS, INQUIRIES},
    },
};

use super::{Ack, ListParams, Listing, put_text, require_all};

/// Customers per page.
pub const CUSTOMERS_PER_PAGE: u32 = 5;

const SEARCH_FIELDS: &[&str] = &["name", "email", "phone", "customer_id"];

/// Build the customers router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/customers", get(index).post(create))
        .route("/api/customers/options", get(options))
        .route(
            "/api/customers/{id}",
            get(show).put(update).delete(destroy),
        )
        .route("/api/customers/{id}/history", get(history))
}

/// Customer view for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct CustomerView {
    pub id: String,
    pub customer_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub notes: String,
    pub created: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inquiry_count: Option<u64>,
}

impl From<&Record> for CustomerView {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id.clone(),
            customer_id: record.text("customer_id").to_string(),
            name: record.text("name").to_string(),
            email: record.text("email").to_string(),
            phone: record.text("phone").to_string(),
            address: record.text("address").to_string(),
            notes: record.text("notes").to_string(),
            created: record.created.clone(),
            inquiry_count: None,
        }
    }
}

/// New customers created within each window.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct NewCustomerCounts {
    pub last_day: u64,
    pub last_week: u64,
    pub last_month: u64,
}

#[derive(Debug, Serialize)]
pub struct CustomersResponse {
    #[serde(flatten)]
    pub listing: Listing<CustomerView>,
    pub new_customers: NewCustomerCounts,
}

/// Create/edit payload.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CustomerInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

impl CustomerInput {
    /// Validate and convert to record fields (without `customer_id`).
    fn into_fields(self) -> Result<Map<String, Value>, AppError> {
        require_all(
            &[self.name.as_deref(), self.phone.as_deref()],
            "Name and phone are required",
        )?;
        let email = Email::parse_optional(self.email.as_deref())
            .map_err(|e| AppError::BadRequest(format!("Invalid email: {e}")))?;

        let mut fields = Map::new();
        put_text(&mut fields, "name", self.name.as_deref());
        put_text(&mut fields, "phone", self.phone.as_deref());
        fields.insert(
            "email".to_string(),
            Value::String(email.map(Email::into_inner).unwrap_or_default()),
        );
        put_text(&mut fields, "address", self.address.as_deref());
        put_text(&mut fields, "notes", self.notes.as_deref());
        Ok(fields)
    }
}

/// Store timestamp format used in `created >= "..."` filters.
fn store_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S%.3fZ").to_string()
}

async fn count<S: RecordStore>(store: &S, collection: &str, filter: Filter) -> Result<u64, StoreError> {
    let page = store
        .list(collection, &ListQuery::new().filter(filter).per_page(1))
        .await?;
    Ok(page.total_items)
}

async fn new_customer_counts<S: RecordStore>(
    store: &S,
    now: DateTime<Utc>,
) -> Result<NewCustomerCounts, StoreError> {
    let since = |days: i64| Filter::gte("created", &store_timestamp(now - Duration::days(days)));
    let (last_day, last_week, last_month) = tokio::try_join!(
        count(store, CUSTOMERS, since(1)),
        count(store, CUSTOMERS, since(7)),
        count(store, CUSTOMERS, since(30)),
    )?;
    Ok(NewCustomerCounts {
        last_day,
        last_week,
        last_month,
    })
}

/// Search customers, newest first, with inquiry counts.
#[instrument(skip(_staff, state))]
pub async fn index(
    RequireStaff(_staff): RequireStaff,
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<CustomersResponse>, AppError> {
    let store = state.store();
    let query = ListQuery::new()
        .maybe_filter(params.search().and_then(|term| Filter::search(SEARCH_FIELDS, term)))
        .sort("-created")
        .page(params.page())
        .per_page(CUSTOMERS_PER_PAGE);
    let page = store.list(CUSTOMERS, &query).await?;

    let mut listing = Listing::from_page(page, |r| CustomerView::from(&r));
    for customer in &mut listing.items {
        customer.inquiry_count = Some(
            count(store, INQUIRIES, Filter::eq("customer_id", &customer.id))
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(customer = %customer.id, error = %e, "Could not count inquiries");
                    0
                }),
        );
    }

    let new_customers = new_customer_counts(store, Utc::now()).await?;
    Ok(Json(CustomersResponse {
        listing,
        new_customers,
    }))
}

#[derive(Debug, Serialize)]
pub struct CustomerOption {
    pub id: String,
    pub name: String,
}

/// Every customer as `{id, name}`.
pub async fn options(
    RequireStaff(_staff): RequireStaff,
    State(state): State<AppState>,
) -> Result<Json<Vec<CustomerOption>>, AppError> {
    let records = state
        .store()
        .list_all(CUSTOMERS, &ListQuery::new().per_page(FULL_LIST_PAGE_SIZE))
        .await?;
    Ok(Json(
        records
            .iter()
            .map(|r| CustomerOption {
                id: r.id.clone(),
                name: r.text("name").to_string(),
            })
            .collect(),
    ))
}

/// Create a customer with the next `CUST_` id.
#[instrument(skip(staff, state, input), fields(staff = %staff.id))]
pub async fn create(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Json(input): Json<CustomerInput>,
) -> Result<(StatusCode, Json<CustomerView>), AppError> {
    let fields = input.into_fields()?;
    let (_, record) = state
        .ids()
        .create_sequenced(SequenceKind::Customer, fields)
        .await?;
    Ok((StatusCode::CREATED, Json(CustomerView::from(&record))))
}

#[derive(Debug, Serialize)]
pub struct CustomerDetail {
    pub customer: CustomerView,
    pub inquiries: InquiryListing,
}

/// A customer with all of their inquiries.
pub async fn show(
    RequireStaff(_staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CustomerDetail>, AppError> {
    let record = state.store().get(CUSTOMERS, &id).await?;
    let inquiries = inquiries::list(
        state.store(),
        &InquiryQuery {
            customer_id: Some(id),
            per_page: Some(FULL_LIST_PAGE_SIZE),
            ..InquiryQuery::default()
        },
    )
    .await?;
    Ok(Json(CustomerDetail {
        customer: CustomerView::from(&record),
        inquiries,
    }))
}

/// Edit a customer's contact details.
#[instrument(skip(staff, state, input), fields(staff = %staff.id))]
pub async fn update(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<CustomerInput>,
) -> Result<Json<CustomerView>, AppError> {
    let fields = input.into_fields()?;
    let record = state
        .store()
        .update(CUSTOMERS, &id, &Value::Object(fields))
        .await?;
    Ok(Json(CustomerView::from(&record)))
}

#[instrument(skip(staff, state), fields(staff = %staff.id))]
pub async fn destroy(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Ack>, AppError> {
    state.store().delete(CUSTOMERS, &id).await?;
    tracing::info!(customer = %id, "Deleted customer");
    Ok(Ack::new("Customer deleted"))
}

#[derive(Debug, Serialize)]
pub struct Purchase {
    pub product_name: String,
    pub quantity: Value,
    pub date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CustomerHistory {
    pub customer: CustomerOption,
    pub purchases: Vec<Purchase>,
}

/// Products a customer has inquired about, newest first.
pub async fn history(
    RequireStaff(_staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CustomerHistory>, AppError> {
    let store = state.store();
    let customer = store.get(CUSTOMERS, &id).await?;
    let records = store
        .list_all(
            INQUIRIES,
            &ListQuery::new()
                .filter(Filter::eq("customer_id", &id))
                .expand("product_id")
                .sort("-created")
                .per_page(FULL_LIST_PAGE_SIZE),
        )
        .await?;

    Ok(Json(CustomerHistory {
        customer: CustomerOption {
            id: customer.id.clone(),
            name: customer.text("name").to_string(),
        },
        purchases: records.iter().map(purchase).collect(),
    }))
}

fn purchase(inquiry: &Record) -> Purchase {
    let product_name = inquiry
        .expanded("product_id")
        .first()
        .map(|p| p.text("name").to_string())
        .unwrap_or_default();
    Purchase {
        product_name,
        quantity: inquiry.get("quantity").cloned().unwrap_or(Value::from(0)),
        date: inquiry.created.clone(),
    }
}

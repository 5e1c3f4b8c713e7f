//! Supplier route handlers. Admin role only.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use rbl_core::Email;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::instrument;

use crate::{
    error::AppError,
    middleware::RequireAdminRole,
    state::AppState,
    store::{
        FULL_LIST_PAGE_SIZE, Filter, ListQuery, Record, RecordStore,
        collections::{PRODUCTS, SUPPLIERS},
    },
};

use super::{Ack, ListParams, Listing, put_text, require_all};

/// Suppliers per page.
pub const SUPPLIERS_PER_PAGE: u32 = 7;

const SEARCH_FIELDS: &[&str] = &["name", "email", "contact"];

/// Build the suppliers router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/suppliers", get(index).post(create))
        .route("/api/suppliers/{id}", get(show).delete(destroy))
        .route("/api/suppliers/{id}/products", get(products))
}

#[derive(Debug, Clone, Serialize)]
pub struct SupplierView {
    pub id: String,
    pub name: String,
    pub email: String,
    pub contact: String,
    pub address: String,
    pub notes: String,
    pub created: Option<String>,
}

impl From<&Record> for SupplierView {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id.clone(),
            name: record.text("name").to_string(),
            email: record.text("email").to_string(),
            contact: record.text("contact").to_string(),
            address: record.text("address").to_string(),
            notes: record.text("notes").to_string(),
            created: record.created.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SupplierInput {
    pub name: Option<String>,
    pub contact: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

impl SupplierInput {
    fn into_fields(self) -> Result<Map<String, Value>, AppError> {
        require_all(
            &[self.name.as_deref(), self.contact.as_deref()],
            "Name and contact are required",
        )?;
        let email = Email::parse_optional(self.email.as_deref())
            .map_err(|e| AppError::BadRequest(format!("Invalid email: {e}")))?;

        let mut fields = Map::new();
        put_text(&mut fields, "name", self.name.as_deref());
        put_text(&mut fields, "contact", self.contact.as_deref());
        fields.insert(
            "email".to_string(),
            Value::String(email.map(Email::into_inner).unwrap_or_default()),
        );
        put_text(&mut fields, "address", self.address.as_deref());
        put_text(&mut fields, "notes", self.notes.as_deref());
        Ok(fields)
    }
}

/// Search suppliers.
#[instrument(skip(_admin, state))]
pub async fn index(
    RequireAdminRole(_admin): RequireAdminRole,
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Listing<SupplierView>>, AppError> {
    let query = ListQuery::new()
        .maybe_filter(params.search().and_then(|term| Filter::search(SEARCH_FIELDS, term)))
        .page(params.page())
        .per_page(SUPPLIERS_PER_PAGE);
    let page = state.store().list(SUPPLIERS, &query).await?;
    Ok(Json(Listing::from_page(page, |r| SupplierView::from(&r))))
}

#[instrument(skip(admin, state, input), fields(staff = %admin.id))]
pub async fn create(
    RequireAdminRole(admin): RequireAdminRole,
    State(state): State<AppState>,
    Json(input): Json<SupplierInput>,
) -> Result<(StatusCode, Json<SupplierView>), AppError> {
    let fields = input.into_fields()?;
    let record = state
        .store()
        .create(SUPPLIERS, &Value::Object(fields))
        .await?;
    tracing::info!(supplier = %record.id, "Created supplier");
    Ok((StatusCode::CREATED, Json(SupplierView::from(&record))))
}

pub async fn show(
    RequireAdminRole(_admin): RequireAdminRole,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SupplierView>, AppError> {
    let record = state.store().get(SUPPLIERS, &id).await?;
    Ok(Json(SupplierView::from(&record)))
}

#[instrument(skip(admin, state), fields(staff = %admin.id))]
pub async fn destroy(
    RequireAdminRole(admin): RequireAdminRole,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Ack>, AppError> {
    state.store().delete(SUPPLIERS, &id).await?;
    tracing::info!(supplier = %id, "Deleted supplier");
    Ok(Ack::new("Supplier deleted"))
}

#[derive(Debug, Serialize)]
pub struct SupplierProduct {
    pub id: String,
    pub product_id: String,
    pub name: String,
    pub description: String,
    pub price: Value,
    pub model: String,
    pub buying_rate: Value,
    pub selling_rate: Value,
    pub specifications: String,
    pub hs_code: String,
    pub created: Option<String>,
}

impl From<&Record> for SupplierProduct {
    fn from(record: &Record) -> Self {
        let raw = |field: &str| record.get(field).cloned().unwrap_or(Value::String(String::new()));
        Self {
            id: record.id.clone(),
            product_id: record.text("product_id").to_string(),
            name: record.text("name").to_string(),
            description: record.text("description").to_string(),
            price: raw("price"),
            model: record.text("model").to_string(),
            buying_rate: raw("buying_rate"),
            selling_rate: raw("selling_rate"),
            specifications: record.text("specifications").to_string(),
            hs_code: record.text("hs_code").to_string(),
            created: record.created.clone(),
        }
    }
}

/// Products whose supplier relation contains this supplier.
pub async fn products(
    RequireAdminRole(_admin): RequireAdminRole,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<SupplierProduct>>, AppError> {
    let records = state
        .store()
        .list_all(
            PRODUCTS,
            &ListQuery::new()
                .filter(Filter::like("supplier", &id))
                .per_page(FULL_LIST_PAGE_SIZE),
        )
        .await?;
    // `~` is a substring match, so confirm the relation really holds the id.
    Ok(Json(
        records
            .iter()
            .filter(|r| r.list_field("supplier").iter().any(|s| *s == id))
            .map(SupplierProduct::from)
            .collect(),
    ))
}

//! Product route handlers.
//!
//! Create and edit take `multipart/form-data` so spec sheets and photos can
//! be uploaded alongside the fields.

use std::collections::{HashMap, HashSet};

use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State, multipart::MultipartError},
    http::StatusCode,
    routing::get,
};
use rbl_core::{BusinessId, Price, SequenceKind};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::instrument;

use crate::{
    error::AppError,
    middleware::RequireStaff,
    state::AppState,
    store::{
        FULL_LIST_PAGE_SIZE, FileUpload, Filter, ListQuery, Record, RecordStore, RecordStoreClient,
        collections::{PRODUCTS, SUPPLIERS},
    },
};

use super::{Ack, ListParams, Listing, non_blank};

/// Products per page.
pub const PRODUCTS_PER_PAGE: u32 = 7;

/// File field holding product documents.
pub const DOCS_FIELD: &str = "uploaded_docs";

const SEARCH_FIELDS: &[&str] = &["product_id", "name", "model"];

/// Free-text fields copied as-is.
const TEXT_FIELDS: &[&str] = &[
    "name",
    "description",
    "product_size",
    "hs_code",
    "box_size",
    "terms",
    "specifications",
    "supplier",
    "model",
];

/// Decimal fields; blank or unreadable input is stored as `""`.
const DECIMAL_FIELDS: &[&str] = &[
    "gross_weight",
    "tax_rate",
    "vat",
    "box_weight",
    "buying_rate",
    "selling_rate",
];

/// Integer fields; blank or unreadable input is stored as `""`.
const INTEGER_FIELDS: &[&str] = &["qty_per_box"];

/// Build the products router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/products", get(index).post(create))
        .route("/api/products/options", get(options))
        .route(
            "/api/products/{id}",
            get(show).patch(update).delete(destroy),
        )
}

/// Supplier summary embedded in product responses.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SupplierSummary {
    pub id: String,
    pub name: String,
    pub email: String,
    pub contact: String,
    pub address: String,
    pub notes: String,
}

impl From<&Record> for SupplierSummary {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id.clone(),
            name: record.text("name").to_string(),
            email: record.text("email").to_string(),
            contact: record.text("contact").to_string(),
            address: record.text("address").to_string(),
            notes: record.text("notes").to_string(),
        }
    }
}

/// Product view for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct ProductView {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    pub supplier_id: Option<String>,
    /// Supplier name, the raw id if the supplier is gone, or "Unknown Supplier".
    pub supplier_name: String,
    pub supplier_data: Option<SupplierSummary>,
    pub files: Vec<String>,
}

impl ProductView {
    fn build(record: &Record, supplier: Option<&Record>, store: &RecordStoreClient) -> Self {
        let supplier_id = record.list_field("supplier").into_iter().next();
        let supplier_name = supplier
            .and_then(|s| s.str_field("name"))
            .map(String::from)
            .or_else(|| supplier_id.clone())
            .unwrap_or_else(|| "Unknown Supplier".to_string());

        let mut fields = record.fields.clone();
        fields.remove("expand");
        Self {
            id: record.id.clone(),
            fields,
            supplier_id,
            supplier_name,
            supplier_data: supplier.map(SupplierSummary::from),
            files: record
                .list_field(DOCS_FIELD)
                .iter()
                .map(|f| store.file_url(PRODUCTS, &record.id, f))
                .collect(),
        }
    }
}

/// Search products, newest first, with supplier names resolved.
#[instrument(skip(_staff, state))]
pub async fn index(
    RequireStaff(_staff): RequireStaff,
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Listing<ProductView>>, AppError> {
    let store = state.store();
    let query = ListQuery::new()
        .maybe_filter(params.search().and_then(|term| Filter::search(SEARCH_FIELDS, term)))
        .sort("-created")
        .page(params.page())
        .per_page(PRODUCTS_PER_PAGE);
    let supplier_query = ListQuery::new().per_page(FULL_LIST_PAGE_SIZE);
    let (page, suppliers) = tokio::try_join!(
        store.list(PRODUCTS, &query),
        store.list_all(SUPPLIERS, &supplier_query),
    )?;

    let suppliers: HashMap<&str, &Record> = suppliers.iter().map(|s| (s.id.as_str(), s)).collect();
    Ok(Json(Listing::from_page(page, |record| {
        let supplier = record
            .list_field("supplier")
            .first()
            .and_then(|id| suppliers.get(id.as_str()).copied());
        ProductView::build(&record, supplier, store)
    })))
}

#[derive(Debug, Serialize)]
pub struct ProductOption {
    pub id: String,
    pub name: String,
    pub price: Value,
}

/// Every product as `{id, name, price}`.
pub async fn options(
    RequireStaff(_staff): RequireStaff,
    State(state): State<AppState>,
) -> Result<Json<Vec<ProductOption>>, AppError> {
    let records = state
        .store()
        .list_all(PRODUCTS, &ListQuery::new().per_page(FULL_LIST_PAGE_SIZE))
        .await?;
    Ok(Json(
        records
            .iter()
            .map(|r| ProductOption {
                id: r.id.clone(),
                name: r.text("name").to_string(),
                price: r.get("price").cloned().unwrap_or(Value::from(0)),
            })
            .collect(),
    ))
}

/// A product with its supplier and file URLs.
pub async fn show(
    RequireStaff(_staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProductView>, AppError> {
    let store = state.store();
    let record = store.get(PRODUCTS, &id).await?;
    let supplier = load_supplier(store, &record).await;
    Ok(Json(ProductView::build(&record, supplier.as_ref(), store)))
}

/// Supplier of a product; lookup failures are logged and treated as missing.
async fn load_supplier(store: &RecordStoreClient, product: &Record) -> Option<Record> {
    let supplier_id = product.list_field("supplier").into_iter().next()?;
    match store.get(SUPPLIERS, &supplier_id).await {
        Ok(supplier) => Some(supplier),
        Err(e) => {
            tracing::warn!(supplier = %supplier_id, error = %e, "Could not load product supplier");
            None
        }
    }
}

/// Create a product. A blank `product_id` gets the next `PROD_` id.
#[instrument(skip(staff, state, multipart), fields(staff = %staff.id))]
pub async fn create(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ProductView>), AppError> {
    let form = ProductForm::read(multipart).await?;
    let store = state.store();
    let mut fields = form.fields()?;

    let record = if let Some(product_id) = form.text("product_id") {
        fields.insert("product_id".to_string(), Value::String(product_id));
        store.create_multipart(PRODUCTS, &fields, &form.files).await?
    } else {
        let (_, record) = state
            .ids()
            .create_sequenced_with(SequenceKind::Product, |id: BusinessId| {
                let mut fields = fields.clone();
                fields.insert("product_id".to_string(), Value::String(id.to_string()));
                let files = &form.files;
                async move { store.create_multipart(PRODUCTS, &fields, files).await }
            })
            .await?;
        record
    };

    let supplier = load_supplier(store, &record).await;
    Ok((
        StatusCode::CREATED,
        Json(ProductView::build(&record, supplier.as_ref(), store)),
    ))
}

/// Edit a product; `files_to_remove` is a comma-separated list of file names.
#[instrument(skip(staff, state, multipart), fields(staff = %staff.id))]
pub async fn update(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<ProductView>, AppError> {
    let form = ProductForm::read(multipart).await?;
    let store = state.store();
    let existing = store.get(PRODUCTS, &id).await?;

    let mut fields = form.fields()?;
    let product_id = form
        .text("product_id")
        .or_else(|| existing.str_field("product_id").map(String::from))
        .unwrap_or_default();
    fields.insert("product_id".to_string(), Value::String(product_id));

    let removals = files_to_remove(form.text("files_to_remove").as_deref(), &existing);
    if !removals.is_empty() {
        fields.insert(
            format!("{DOCS_FIELD}-"),
            Value::Array(removals.into_iter().map(Value::String).collect()),
        );
    }

    let record = store
        .update_multipart(PRODUCTS, &id, &fields, &form.files)
        .await?;
    let supplier = load_supplier(store, &record).await;
    Ok(Json(ProductView::build(&record, supplier.as_ref(), store)))
}

#[instrument(skip(staff, state), fields(staff = %staff.id))]
pub async fn destroy(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Ack>, AppError> {
    state.store().delete(PRODUCTS, &id).await?;
    tracing::info!(product = %id, "Deleted product");
    Ok(Ack::new("Product deleted"))
}

/// Parsed multipart product form.
#[derive(Debug, Default)]
struct ProductForm {
    text: HashMap<String, String>,
    files: Vec<FileUpload>,
}

impl ProductForm {
    async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
            let Some(name) = field.name().map(String::from) else {
                continue;
            };
            if let Some(filename) = field.file_name().map(String::from) {
                let content_type = field.content_type().map(String::from);
                let data = field.bytes().await.map_err(bad_multipart)?;
                // Browsers send an empty part for an untouched file input.
                if filename.is_empty() || data.is_empty() {
                    continue;
                }
                form.files.push(FileUpload {
                    field: DOCS_FIELD.to_string(),
                    filename,
                    content_type,
                    data: data.to_vec(),
                });
            } else {
                let value = field.text().await.map_err(bad_multipart)?;
                form.text.insert(name, value);
            }
        }
        Ok(form)
    }

    fn text(&self, key: &str) -> Option<String> {
        non_blank(self.text.get(key).map(String::as_str))
    }

    /// Normalized record fields, without `product_id`.
    fn fields(&self) -> Result<Map<String, Value>, AppError> {
        product_fields(&self.text)
    }
}

fn bad_multipart(e: MultipartError) -> AppError {
    AppError::BadRequest(format!("Invalid form data: {e}"))
}

/// Normalize submitted product fields.
///
/// Price must be a number when given (blank means 0); other numeric fields
/// fall back to `""` when blank or unreadable.
fn product_fields(raw: &HashMap<String, String>) -> Result<Map<String, Value>, AppError> {
    let get = |key: &str| field(raw, key);
    let mut fields = Map::new();

    for key in TEXT_FIELDS {
        fields.insert((*key).to_string(), Value::String(get(key).to_string()));
    }
    for key in DECIMAL_FIELDS {
        let value = Price::parse_lenient(get(key))
            .map(|p| p.to_string())
            .unwrap_or_default();
        fields.insert((*key).to_string(), Value::String(value));
    }
    for key in INTEGER_FIELDS {
        let value = get(key)
            .parse::<i64>()
            .map(|n| n.to_string())
            .unwrap_or_default();
        fields.insert((*key).to_string(), Value::String(value));
    }

    let price = match get("price") {
        "" => Price::ZERO,
        raw_price => Price::parse_lenient(raw_price)
            .ok_or_else(|| AppError::BadRequest("Invalid price".to_string()))?,
    };
    fields.insert("price".to_string(), Value::String(price.to_string()));

    Ok(fields)
}

fn field<'a>(raw: &'a HashMap<String, String>, key: &str) -> &'a str {
    raw.get(key).map_or("", |v| v.trim())
}

/// Requested removals that are actually attached to the product.
fn files_to_remove(requested: Option<&str>, existing: &Record) -> Vec<String> {
    let Some(requested) = requested else {
        return Vec::new();
    };
    let requested: HashSet<&str> = requested
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    existing
        .list_field(DOCS_FIELD)
        .into_iter()
        .filter(|f| requested.contains(f.as_str()))
        .collect()
}

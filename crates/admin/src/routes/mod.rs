//! HTTP route handlers for the back office.
//!
//! # Route Structure
//!
//! ```text
//! # Auth
//! POST /auth/login                      - Password login (form: email, password)
//! POST /auth/logout                     - Logout
//! POST /auth/forgot-password            - Request a password-reset email
//! GET  /auth/me                         - Current staff member
//!
//! # Dashboard
//! GET  /api/dashboard                   - Counts and top customers
//!
//! # Customers
//! GET  /api/customers                   - Search, paginate, new-customer counts
//! POST /api/customers                   - Create (assigns CUST_ id)
//! GET  /api/customers/options           - id + name for pickers
//! GET  /api/customers/{id}              - Customer with inquiries
//! PUT  /api/customers/{id}              - Edit
//! DELETE /api/customers/{id}            - Delete
//! GET  /api/customers/{id}/history      - Purchase history
//!
//! # Products
//! GET  /api/products                    - Search, paginate, supplier names
//! POST /api/products                    - Create, multipart (assigns PROD_ id)
//! GET  /api/products/options            - id + name + price
//! GET  /api/products/{id}               - Product with supplier and files
//! PATCH /api/products/{id}              - Edit, multipart
//! DELETE /api/products/{id}             - Delete
//!
//! # Suppliers (admin role)
//! GET  /api/suppliers                   - Search, paginate
//! POST /api/suppliers                   - Create
//! GET  /api/suppliers/{id}              - Supplier details
//! DELETE /api/suppliers/{id}            - Delete
//! GET  /api/suppliers/{id}/products     - Products from this supplier
//!
//! # Staff (admin role)
//! GET  /api/staff                       - Every staff account
//! POST /api/staff                       - Create (name, email, password, role)
//! GET  /api/staff/{id}                  - Staff account
//! PUT  /api/staff/{id}                  - Edit (password only when given)
//! DELETE /api/staff/{id}                - Delete (not your own)
//!
//! # Inquiries
//! GET  /api/inquiries                   - Search, paginate, stats
//! POST /api/inquiries                   - Create (assigns inquiry number)
//! PUT  /api/inquiries/{id}              - Edit (recomputes inquiry number)
//! DELETE /api/inquiries/{id}            - Delete
//!
//! # Reminders
//! GET  /api/reminders                   - Newest 100
//! POST /api/reminders                   - Create
//! PUT  /api/reminders/{id}              - Edit (resets delivery state)
//! DELETE /api/reminders/{id}            - Delete
//! ```

pub mod auth;
pub mod customers;
pub mod dashboard;
pub mod inquiries;
pub mod products;
pub mod reminders;
pub mod staff;
pub mod suppliers;

use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::state::AppState;
use crate::store::Page;

/// Build the complete router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(dashboard::router())
        .merge(customers::router())
        .merge(products::router())
        .merge(suppliers::router())
        .merge(staff::router())
        .merge(inquiries::router())
        .merge(reminders::router())
}

/// Search and pagination query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ListParams {
    pub page: Option<u32>,
    pub search: Option<String>,
}

impl ListParams {
    /// Requested page, at least 1.
    #[must_use]
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    /// Trimmed search term, if any.
    #[must_use]
    pub fn search(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// One page of items in API responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub total_items: u64,
    pub total_pages: u32,
    pub current_page: u32,
    pub per_page: u32,
}

impl<T> Listing<T> {
    /// Convert a store page, mapping each record.
    pub fn from_page(page: Page, map: impl FnMut(crate::store::Record) -> T) -> Self {
        Self {
            total_items: page.total_items,
            total_pages: page.total_pages.max(1),
            current_page: page.page.max(1),
            per_page: page.per_page,
            items: page.items.into_iter().map(map).collect(),
        }
    }
}

/// `{"message": ..., "id": ...}` acknowledgement.
#[derive(Debug, Clone, Serialize)]
pub struct Ack {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Ack {
    pub const fn new(message: &'static str) -> Json<Self> {
        Json(Self { message, id: None })
    }

    pub const fn with_id(message: &'static str, id: String) -> Json<Self> {
        Json(Self {
            message,
            id: Some(id),
        })
    }
}

/// Trimmed, non-empty text or `None`.
pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Insert trimmed text (or `""`) under `key`.
pub(crate) fn put_text(fields: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    fields.insert(
        key.to_string(),
        Value::String(value.map(str::trim).unwrap_or_default().to_string()),
    );
}

/// Reject the request unless every named value is present.
pub(crate) fn require_all(values: &[Option<&str>], message: &str) -> Result<(), AppError> {
    if values.iter().all(|v| non_blank(*v).is_some()) {
        Ok(())
    } else {
        Err(AppError::BadRequest(message.to_string()))
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod router_tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::{config::test_config, middleware::create_session_layer, store::RecordStoreClient};

    /// Router whose store points at a closed port; none of these requests reach it.
    fn app() -> Router {
        let config = test_config();
        let store = RecordStoreClient::anonymous("http://127.0.0.1:9").unwrap();
        routes()
            .layer(create_session_layer(&config))
            .with_state(AppState::new(config, store))
    }

    async fn send(request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_api_requires_login() {
        for uri in [
            "/api/dashboard",
            "/api/customers",
            "/api/products",
            "/api/suppliers",
            "/api/staff",
            "/api/inquiries",
            "/api/reminders",
            "/auth/me",
        ] {
            let request = Request::get(uri).body(Body::empty()).unwrap();
            let (status, body) = send(request).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(body["error"], "Login required", "{uri}");
        }
    }

    #[tokio::test]
    async fn test_forgot_password_requires_email() {
        let request = Request::post("/auth/forgot-password")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("email=+"))
            .unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().ends_with("Email is required"));
    }
}

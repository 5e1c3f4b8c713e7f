//! Staff account management. Admin role only.
//!
//! Staff accounts live in the store's `users` auth collection. Passwords are
//! write-only: they are sent with a matching `passwordConfirm` and never read
//! back.

use std::fmt;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use rbl_core::{Email, StaffRole};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::instrument;

use crate::{
    error::AppError,
    middleware::RequireAdminRole,
    state::AppState,
    store::{FULL_LIST_PAGE_SIZE, ListQuery, Record, RecordStore, USERS_COLLECTION},
};

use super::{Ack, non_blank};

/// Shortest password the store accepts.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Build the staff router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/staff", get(index).post(create))
        .route("/api/staff/{id}", get(show).put(update).delete(destroy))
}

#[derive(Debug, Clone, Serialize)]
pub struct StaffView {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: StaffRole,
    pub verified: bool,
    pub created: Option<String>,
}

impl From<&Record> for StaffView {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id.clone(),
            email: record.text("email").to_string(),
            name: record.text("name").to_string(),
            role: StaffRole::from_record(record.str_field("role")),
            verified: record.bool_field("verified"),
            created: record.created.clone(),
        }
    }
}

/// Create/edit payload.
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct StaffInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub password: Option<String>,
    pub verified: Option<bool>,
}

impl fmt::Debug for StaffInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaffInput")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("verified", &self.verified)
            .finish()
    }
}

fn parse_role(raw: Option<&str>) -> Result<StaffRole, AppError> {
    match non_blank(raw) {
        None => Ok(StaffRole::Staff),
        Some(role) => role
            .to_ascii_lowercase()
            .parse::<StaffRole>()
            .map_err(|_| AppError::BadRequest("Role must be admin or staff".to_string())),
    }
}

fn parse_email(raw: &str) -> Result<Email, AppError> {
    Email::parse(raw).map_err(|e| AppError::BadRequest(format!("Invalid email: {e}")))
}

/// Insert `password` and its confirmation.
fn put_password(fields: &mut Map<String, Value>, password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    fields.insert("password".to_string(), Value::from(password));
    fields.insert("passwordConfirm".to_string(), Value::from(password));
    Ok(())
}

impl StaffInput {
    /// Fields for a new account. Name, email and password are required.
    fn into_new_fields(self) -> Result<Map<String, Value>, AppError> {
        let (Some(name), Some(email), Some(password)) = (
            non_blank(self.name.as_deref()),
            non_blank(self.email.as_deref()),
            self.password.filter(|p| !p.trim().is_empty()),
        ) else {
            return Err(AppError::BadRequest(
                "Name, email and password are required".to_string(),
            ));
        };

        let mut fields = Map::new();
        fields.insert("name".to_string(), Value::String(name));
        fields.insert(
            "email".to_string(),
            Value::String(parse_email(&email)?.into_inner()),
        );
        fields.insert(
            "role".to_string(),
            Value::String(parse_role(self.role.as_deref())?.to_string()),
        );
        fields.insert(
            "verified".to_string(),
            Value::Bool(self.verified.unwrap_or(false)),
        );
        fields.insert("emailVisibility".to_string(), Value::Bool(true));
        put_password(&mut fields, &password)?;
        Ok(fields)
    }

    /// Fields to patch. Only values that were sent are changed; a blank
    /// password leaves the current one in place.
    fn into_patch(self) -> Result<Map<String, Value>, AppError> {
        let mut fields = Map::new();
        if let Some(name) = non_blank(self.name.as_deref()) {
            fields.insert("name".to_string(), Value::String(name));
        }
        if let Some(email) = non_blank(self.email.as_deref()) {
            fields.insert(
                "email".to_string(),
                Value::String(parse_email(&email)?.into_inner()),
            );
        }
        if non_blank(self.role.as_deref()).is_some() {
            fields.insert(
                "role".to_string(),
                Value::String(parse_role(self.role.as_deref())?.to_string()),
            );
        }
        if let Some(verified) = self.verified {
            fields.insert("verified".to_string(), Value::Bool(verified));
        }
        if let Some(password) = self.password.filter(|p| !p.trim().is_empty()) {
            put_password(&mut fields, &password)?;
        }
        Ok(fields)
    }
}

/// Every staff account, oldest first.
pub async fn index(
    RequireAdminRole(_admin): RequireAdminRole,
    State(state): State<AppState>,
) -> Result<Json<Vec<StaffView>>, AppError> {
    let query = ListQuery::new().sort("created").per_page(FULL_LIST_PAGE_SIZE);
    let users = state.store().list_all(USERS_COLLECTION, &query).await?;
    Ok(Json(users.iter().map(StaffView::from).collect()))
}

#[instrument(skip(admin, state, input), fields(staff = %admin.id))]
pub async fn create(
    RequireAdminRole(admin): RequireAdminRole,
    State(state): State<AppState>,
    Json(input): Json<StaffInput>,
) -> Result<(StatusCode, Json<StaffView>), AppError> {
    let fields = input.into_new_fields()?;
    let record = state
        .store()
        .create(USERS_COLLECTION, &Value::Object(fields))
        .await?;
    tracing::info!(user = %record.id, "Created staff member");
    Ok((StatusCode::CREATED, Json(StaffView::from(&record))))
}

pub async fn show(
    RequireAdminRole(_admin): RequireAdminRole,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StaffView>, AppError> {
    let record = state.store().get(USERS_COLLECTION, &id).await?;
    Ok(Json(StaffView::from(&record)))
}

#[instrument(skip(admin, state, input), fields(staff = %admin.id))]
pub async fn update(
    RequireAdminRole(admin): RequireAdminRole,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<StaffInput>,
) -> Result<Json<StaffView>, AppError> {
    let fields = input.into_patch()?;
    let record = if fields.is_empty() {
        state.store().get(USERS_COLLECTION, &id).await?
    } else {
        state
            .store()
            .update(USERS_COLLECTION, &id, &Value::Object(fields))
            .await?
    };
    tracing::info!(user = %id, "Updated staff member");
    Ok(Json(StaffView::from(&record)))
}

/// Delete another staff member's account.
#[instrument(skip(admin, state), fields(staff = %admin.id))]
pub async fn destroy(
    RequireAdminRole(admin): RequireAdminRole,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Ack>, AppError> {
    if id == admin.id {
        return Err(AppError::BadRequest(
            "You cannot delete your own account".to_string(),
        ));
    }
    let record = state.store().get(USERS_COLLECTION, &id).await?;
    state.store().delete(USERS_COLLECTION, &id).await?;
    tracing::info!(user = %id, email = %record.text("email"), "Deleted staff member");
    Ok(Ack::new("Staff member deleted"))
}

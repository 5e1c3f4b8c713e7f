//! Reminder route handlers.
//!
//! Scheduled times are stored in UTC as `%Y-%m-%dT%H:%M`. Forms send either
//! `datetime_utc` (already converted in the browser) or `datetime` as Nepal
//! wall-clock time.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
};
use chrono::{DateTime, FixedOffset, Utc};
use rbl_core::{Email, format_minutes, local_to_utc, parse_utc_timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::instrument;

use crate::{
    error::AppError,
    middleware::RequireStaff,
    services::reminders::fields,
    state::AppState,
    store::{ListQuery, Record, RecordStore, collections::REMINDERS},
};

use super::{Ack, non_blank};

/// Reminders returned by the listing.
pub const REMINDERS_LISTED: u32 = 100;

/// Nepal Standard Time, UTC+05:45.
const LOCAL_OFFSET_SECS: i32 = 5 * 3600 + 45 * 60;

/// Build the reminders router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/reminders", get(index).post(create))
        .route("/api/reminders/{id}", put(update).delete(destroy))
}

#[derive(Debug, Clone, Serialize)]
pub struct ReminderView {
    pub id: String,
    pub topic: String,
    pub description: String,
    pub datetime: String,
    pub email: String,
    pub sent: bool,
    pub failed: bool,
    pub attempts: u32,
    pub created: Option<String>,
}

impl From<Record> for ReminderView {
    fn from(record: Record) -> Self {
        Self {
            topic: record.text(fields::TOPIC).to_string(),
            description: record.text(fields::DESCRIPTION).to_string(),
            datetime: record.text(fields::DATETIME).to_string(),
            email: record.text(fields::EMAIL).to_string(),
            sent: record.bool_field(fields::SENT),
            failed: record.bool_field(fields::FAILED),
            attempts: record.u32_field(fields::ATTEMPTS),
            created: record.created,
            id: record.id,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReminderInput {
    pub topic: Option<String>,
    pub description: Option<String>,
    pub email: Option<String>,
    pub datetime: Option<String>,
    pub datetime_utc: Option<String>,
}

impl ReminderInput {
    /// When the reminder is due, in UTC.
    fn scheduled_at(&self) -> Result<DateTime<Utc>, AppError> {
        let invalid = |e: rbl_core::TimestampError| {
            AppError::BadRequest(format!("Invalid datetime format: {e}"))
        };
        if let Some(utc) = non_blank(self.datetime_utc.as_deref()) {
            return parse_utc_timestamp(&utc).map_err(invalid);
        }
        let local = non_blank(self.datetime.as_deref())
            .ok_or_else(|| AppError::BadRequest("All fields are required".to_string()))?;
        let offset = FixedOffset::east_opt(LOCAL_OFFSET_SECS)
            .ok_or_else(|| AppError::Internal("invalid local offset".to_string()))?;
        local_to_utc(&local, offset).map_err(invalid)
    }

    /// Record fields for a pending reminder.
    fn into_fields(self) -> Result<Value, AppError> {
        let (Some(topic), Some(description), Some(email)) = (
            non_blank(self.topic.as_deref()),
            non_blank(self.description.as_deref()),
            non_blank(self.email.as_deref()),
        ) else {
            return Err(AppError::BadRequest("All fields are required".to_string()));
        };
        let email =
            Email::parse(&email).map_err(|e| AppError::BadRequest(format!("Invalid email: {e}")))?;
        let scheduled_at = self.scheduled_at()?;

        Ok(json!({
            (fields::TOPIC): topic,
            (fields::DESCRIPTION): description,
            (fields::EMAIL): email,
            (fields::DATETIME): format_minutes(scheduled_at),
            (fields::SENT): false,
            (fields::FAILED): false,
            (fields::ATTEMPTS): 0,
        }))
    }
}

/// Newest reminders first.
pub async fn index(
    RequireStaff(_staff): RequireStaff,
    State(state): State<AppState>,
) -> Result<Json<Vec<ReminderView>>, AppError> {
    let query = ListQuery::new().sort("-created").per_page(REMINDERS_LISTED);
    let page = state.store().list(REMINDERS, &query).await?;
    Ok(Json(page.items.into_iter().map(ReminderView::from).collect()))
}

#[instrument(skip(staff, state, input), fields(staff = %staff.id))]
pub async fn create(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Json(input): Json<ReminderInput>,
) -> Result<(StatusCode, Json<Ack>), AppError> {
    let record = state.store().create(REMINDERS, &input.into_fields()?).await?;
    tracing::info!(reminder = %record.id, "Created reminder");
    Ok((StatusCode::CREATED, Ack::with_id("Reminder saved", record.id)))
}

/// Replace a reminder and make it pending again.
#[instrument(skip(staff, state, input), fields(staff = %staff.id))]
pub async fn update(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<ReminderInput>,
) -> Result<Json<Ack>, AppError> {
    state.store().update(REMINDERS, &id, &input.into_fields()?).await?;
    Ok(Ack::new("Reminder updated"))
}

#[instrument(skip(staff, state), fields(staff = %staff.id))]
pub async fn destroy(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Ack>, AppError> {
    state.store().delete(REMINDERS, &id).await?;
    tracing::info!(reminder = %id, "Deleted reminder");
    Ok(Ack::new("Reminder deleted"))
}

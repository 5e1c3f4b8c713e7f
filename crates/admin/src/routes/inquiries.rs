//! Inquiry route handlers.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
};
use tracing::instrument;

use crate::{
    error::AppError,
    middleware::RequireStaff,
    services::inquiries::{self, InquiryInput, InquiryListing, InquiryQuery},
    state::AppState,
    store::{RecordStore, StoreError, collections::INQUIRIES},
};

use super::{Ack, non_blank};

/// Build the inquiries router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/inquiries", get(index).post(create))
        .route("/api/inquiries/{id}", put(update).delete(destroy))
}

/// Search and paginate inquiries.
pub async fn index(
    RequireStaff(_staff): RequireStaff,
    State(state): State<AppState>,
    Query(query): Query<InquiryQuery>,
) -> Result<Json<InquiryListing>, AppError> {
    Ok(Json(inquiries::list(state.store(), &query).await?))
}

/// Create an inquiry for an existing customer and product.
#[instrument(skip(staff, state, input), fields(staff = %staff.id))]
pub async fn create(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Json(input): Json<InquiryInput>,
) -> Result<(StatusCode, Json<Ack>), AppError> {
    let (Some(customer_id), Some(product_id)) = (
        non_blank(input.customer_id.as_deref()),
        non_blank(input.product_id.as_deref()),
    ) else {
        return Err(AppError::BadRequest(
            "Customer and Product are required".to_string(),
        ));
    };

    let record = inquiries::create(state.store(), state.year(), &customer_id, &product_id, input)
        .await
        .map_err(unknown_reference)?;
    Ok((StatusCode::CREATED, Ack::with_id("Inquiry created", record.id)))
}

#[instrument(skip(staff, state, input), fields(staff = %staff.id))]
pub async fn update(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<InquiryInput>,
) -> Result<Json<Ack>, AppError> {
    inquiries::update(state.store(), state.year(), &id, input).await?;
    Ok(Ack::new("Inquiry updated"))
}

#[instrument(skip(staff, state), fields(staff = %staff.id))]
pub async fn destroy(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Ack>, AppError> {
    state.store().delete(INQUIRIES, &id).await?;
    tracing::info!(inquiry = %id, "Deleted inquiry");
    Ok(Ack::new("Inquiry deleted"))
}

/// A missing customer or product is the caller's mistake, not a missing inquiry.
fn unknown_reference(error: StoreError) -> AppError {
    match error {
        StoreError::NotFound(_) => {
            AppError::BadRequest("Customer or product does not exist".to_string())
        }
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_reference_is_bad_request() {
        let error = unknown_reference(StoreError::NotFound("customers/x".to_string()));
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);

        let error = unknown_reference(StoreError::Parse("bad json".to_string()));
        assert_eq!(error.status(), StatusCode::BAD_GATEWAY);
    }
}

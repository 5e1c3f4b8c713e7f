//! Dashboard route handler.

use axum::{Json, Router, extract::State, routing::get};

use crate::{
    error::AppError,
    middleware::RequireStaff,
    services::{DashboardSummary, dashboard},
    state::AppState,
};

/// Build the dashboard router.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/dashboard", get(show))
}

/// Record counts and the top customers by inquiries and by amount.
pub async fn show(
    RequireStaff(_staff): RequireStaff,
    State(state): State<AppState>,
) -> Result<Json<DashboardSummary>, AppError> {
    Ok(Json(dashboard::load(state.store()).await?))
}

//! Authentication extractors for staff routes.
//!
//! Every API route except health and login takes one of these extractors.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use tower_sessions::Session;

use crate::error::set_sentry_user;
use crate::models::{CurrentStaff, session_keys};

/// Extractor that requires a logged-in staff member.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(RequireStaff(staff): RequireStaff) -> impl IntoResponse {
///     format!("Hello, {}!", staff.name)
/// }
/// ```
pub struct RequireStaff(pub CurrentStaff);

/// Extractor that requires a logged-in staff member with the `admin` role.
pub struct RequireAdminRole(pub CurrentStaff);

/// Rejection for the staff extractors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaffAuthRejection {
    /// No session or no staff member in it.
    Unauthorized,
    /// Logged in, but the role does not allow this route.
    Forbidden,
}

impl IntoResponse for StaffAuthRejection {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "Login required"),
            Self::Forbidden => (StatusCode::FORBIDDEN, "Admin role required"),
        };
        (status, axum::Json(serde_json::json!({ "error": message }))).into_response()
    }
}

async fn current_staff(parts: &Parts) -> Result<CurrentStaff, StaffAuthRejection> {
    let session = parts
        .extensions
        .get::<Session>()
        .ok_or(StaffAuthRejection::Unauthorized)?;

    let staff: CurrentStaff = session
        .get(session_keys::CURRENT_STAFF)
        .await
        .ok()
        .flatten()
        .ok_or(StaffAuthRejection::Unauthorized)?;

    set_sentry_user(&staff.id, Some(staff.email.as_str()));
    Ok(staff)
}

impl<S> FromRequestParts<S> for RequireStaff
where
    S: Send + Sync,
{
    type Rejection = StaffAuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        current_staff(parts).await.map(Self)
    }
}

impl<S> FromRequestParts<S> for RequireAdminRole
where
    S: Send + Sync,
{
    type Rejection = StaffAuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let staff = current_staff(parts).await?;
        if !staff.role.can_manage_suppliers() {
            return Err(StaffAuthRejection::Forbidden);
        }
        Ok(Self(staff))
    }
}

/// Store the logged-in staff member in the session.
///
/// The session id is cycled first so a pre-login id cannot be reused.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_staff(
    session: &Session,
    staff: &CurrentStaff,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_STAFF, staff).await
}

/// Drop the session entirely (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_staff(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}

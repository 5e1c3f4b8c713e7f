//! Staff login, logout and password reset.

use axum::{
    Form, Json, Router,
    extract::State,
    routing::{get, post},
};
use secrecy::SecretString;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::{
    error::{AppError, clear_sentry_user},
    middleware::{RequireStaff, clear_current_staff, set_current_staff},
    models::CurrentStaff,
    state::AppState,
    store::StoreError,
};

use super::Ack;

/// Build the auth router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/me", get(me))
}

/// Login form.
#[derive(Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Forgot-password form.
#[derive(Debug, Deserialize)]
pub struct ForgotPasswordForm {
    pub email: String,
}

/// Verify credentials against the `users` collection and start a session.
#[instrument(skip(state, session, form), fields(email = %form.email))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Json<CurrentStaff>, AppError> {
    let email = form.email.trim();
    let password = SecretString::from(form.password);
    let user = match state.store().authenticate_user(email, &password).await {
        Ok(user) => user,
        Err(StoreError::Unauthorized(_)) => {
            tracing::info!("Login rejected");
            return Err(AppError::Unauthorized(
                "Invalid email or password".to_string(),
            ));
        }
        Err(e) => return Err(e.into()),
    };

    let staff = CurrentStaff::from_user(&user).ok_or_else(|| {
        AppError::Internal("store returned a user without an email".to_string())
    })?;
    set_current_staff(&session, &staff)
        .await
        .map_err(|e| AppError::Internal(format!("session error: {e}")))?;

    tracing::info!(staff_id = %staff.id, role = %staff.role, "Staff logged in");
    Ok(Json(staff))
}

/// End the session.
pub async fn logout(session: Session) -> Result<Json<Ack>, AppError> {
    clear_current_staff(&session)
        .await
        .map_err(|e| AppError::Internal(format!("session error: {e}")))?;
    clear_sentry_user();
    Ok(Ack::new("Logged out"))
}

/// Ask the store to email a reset link.
///
/// Always answers with the same message so addresses cannot be probed.
#[instrument(skip(state, form))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Form(form): Form<ForgotPasswordForm>,
) -> Result<Json<Ack>, AppError> {
    let email = form.email.trim();
    if email.is_empty() {
        return Err(AppError::BadRequest("Email is required".to_string()));
    }

    if let Err(e) = state.store().request_password_reset(email).await {
        if e.is_unavailable() {
            return Err(e.into());
        }
        tracing::warn!(error = %e, "Password reset request rejected");
    }

    Ok(Ack::new(
        "If that address belongs to a staff account, a reset link has been sent",
    ))
}

/// The logged-in staff member.
pub async fn me(RequireStaff(staff): RequireStaff) -> Json<CurrentStaff> {
    Json(staff)
}

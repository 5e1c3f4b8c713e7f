//! Record store authentication.
//!
//! Admin tokens authorize every service call; user tokens only prove a staff
//! member's password at login and are not kept.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use url::Url;

use super::StoreError;
use super::types::{AuthenticatedUser, Record};

/// Admin password authentication endpoint.
const ADMIN_AUTH_PATH: &str = "api/admins/auth-with-password";

/// Staff user collection.
pub const USERS_COLLECTION: &str = "users";

/// Request body for password authentication.
#[derive(Serialize)]
struct AuthRequest<'a> {
    identity: &'a str,
    password: &'a str,
}

/// Response from admin authentication.
#[derive(Deserialize)]
struct AdminAuthResponse {
    token: String,
}

/// Response from user authentication.
#[derive(Deserialize)]
struct UserAuthResponse {
    token: String,
    record: Record,
}

/// Authenticate as a store admin and return the bearer token.
///
/// # Errors
///
/// Returns `StoreError::Unauthorized` if the credentials are rejected.
#[instrument(skip(client, base, password), fields(email = %email))]
pub async fn authenticate_admin(
    client: &reqwest::Client,
    base: &Url,
    email: &str,
    password: &SecretString,
) -> Result<SecretString, StoreError> {
    let response = client
        .post(base.join(ADMIN_AUTH_PATH)?)
        .json(&AuthRequest {
            identity: email,
            password: password.expose_secret(),
        })
        .send()
        .await?;

    let response = check_auth_response(response).await?;
    let body: AdminAuthResponse = response
        .json()
        .await
        .map_err(|e| StoreError::Parse(format!("Failed to parse admin auth response: {e}")))?;

    Ok(SecretString::from(body.token))
}

/// Verify a staff member's password against the `users` collection.
///
/// # Errors
///
/// Returns `StoreError::Unauthorized` for a wrong email or password.
#[instrument(skip(client, base, password), fields(email = %email))]
pub async fn authenticate_user(
    client: &reqwest::Client,
    base: &Url,
    email: &str,
    password: &SecretString,
) -> Result<AuthenticatedUser, StoreError> {
    let path = format!("api/collections/{USERS_COLLECTION}/auth-with-password");
    let response = client
        .post(base.join(&path)?)
        .json(&AuthRequest {
            identity: email,
            password: password.expose_secret(),
        })
        .send()
        .await?;

    let response = check_auth_response(response).await?;
    let body: UserAuthResponse = response
        .json()
        .await
        .map_err(|e| StoreError::Parse(format!("Failed to parse user auth response: {e}")))?;

    Ok(AuthenticatedUser {
        token: SecretString::from(body.token),
        record: body.record,
    })
}

/// Ask the store to email a password-reset link.
///
/// The store answers 204 whether or not the address exists.
///
/// # Errors
///
/// Returns an error if the request fails or is rejected.
#[instrument(skip(client, base))]
pub async fn request_password_reset(
    client: &reqwest::Client,
    base: &Url,
    email: &str,
) -> Result<(), StoreError> {
    let path = format!("api/collections/{USERS_COLLECTION}/request-password-reset");
    let response = client
        .post(base.join(&path)?)
        .json(&serde_json::json!({ "email": email }))
        .send()
        .await?;

    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::from_status(status.as_u16(), &body))
}

/// Authentication failures come back as 400 with a generic message; report
/// them as unauthorized rather than as validation errors.
async fn check_auth_response(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match StoreError::from_status(status.as_u16(), &body) {
        StoreError::Validation(message) => Err(StoreError::Unauthorized(message)),
        other => Err(other),
    }
}

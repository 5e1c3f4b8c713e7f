//! HTTP client for the record store.

use std::sync::Arc;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::instrument;
use url::Url;

use super::auth::{authenticate_admin, authenticate_user, request_password_reset};
use super::types::{AuthenticatedUser, FileUpload, ListQuery, Page, Record};
use super::{RecordStore, StoreError};
use crate::config::RecordStoreConfig;

/// Per-request timeout for store calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Record store REST client.
///
/// Owns the admin token. Call [`RecordStoreClient::authenticate`] once at
/// startup; a request rejected with 401 re-authenticates and is retried once.
#[derive(Clone)]
pub struct RecordStoreClient {
    inner: Arc<RecordStoreClientInner>,
}

struct RecordStoreClientInner {
    client: reqwest::Client,
    base: Url,
    credentials: Option<AdminCredentials>,
    token: RwLock<Option<SecretString>>,
}

struct AdminCredentials {
    email: String,
    password: SecretString,
}

impl RecordStoreClient {
    /// Create a client for the configured store. No request is made yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client fails to build.
    pub fn new(config: &RecordStoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            inner: Arc::new(RecordStoreClientInner {
                client,
                base: normalize_base(&config.url)?,
                credentials: Some(AdminCredentials {
                    email: config.admin_email.clone(),
                    password: config.admin_password.clone(),
                }),
                token: RwLock::new(None),
            }),
        })
    }

    /// Create a client without admin credentials (public collections only).
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client fails to build.
    pub fn anonymous(base_url: &str) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            inner: Arc::new(RecordStoreClientInner {
                client,
                base: normalize_base(base_url)?,
                credentials: None,
                token: RwLock::new(None),
            }),
        })
    }

    /// Base URL of the store.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Authenticate as admin and cache the token.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unauthorized` if no credentials are configured or
    /// the store rejects them.
    #[instrument(skip(self))]
    pub async fn authenticate(&self) -> Result<(), StoreError> {
        let Some(credentials) = &self.inner.credentials else {
            return Err(StoreError::Unauthorized(
                "no admin credentials configured".to_string(),
            ));
        };

        let token = authenticate_admin(
            &self.inner.client,
            &self.inner.base,
            &credentials.email,
            &credentials.password,
        )
        .await?;
        *self.inner.token.write().await = Some(token);

        tracing::info!("Authenticated with record store");
        Ok(())
    }

    /// Whether an admin token is cached.
    pub async fn is_authenticated(&self) -> bool {
        self.inner.token.read().await.is_some()
    }

    /// Verify a staff member's credentials.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unauthorized` for a wrong email or password.
    pub async fn authenticate_user(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<AuthenticatedUser, StoreError> {
        authenticate_user(&self.inner.client, &self.inner.base, email, password).await
    }

    /// Request a password-reset email for a staff member.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the request.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), StoreError> {
        request_password_reset(&self.inner.client, &self.inner.base, email).await
    }

    /// Check that the store answers its health endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable or unhealthy.
    pub async fn health(&self) -> Result<(), StoreError> {
        let response = self
            .inner
            .client
            .get(self.inner.base.join("api/health")?)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::from_status(status.as_u16(), &body))
    }

    // =========================================================================
    // Records
    // =========================================================================

    /// Create a record with file attachments (multipart).
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the record.
    #[instrument(skip(self, fields, files), fields(files = files.len()))]
    pub async fn create_multipart(
        &self,
        collection: &str,
        fields: &Map<String, Value>,
        files: &[FileUpload],
    ) -> Result<Record, StoreError> {
        let url = self.records_url(collection, None)?;
        let response = self
            .send(|client| Ok(client.post(url.clone()).multipart(multipart_form(fields, files)?)))
            .await?;
        decode(response).await
    }

    /// Update a record with file attachments (multipart).
    ///
    /// Use the `field-` key suffix (e.g. `uploaded_docs-`) with a list of file
    /// names to remove existing attachments.
    ///
    /// # Errors
    ///
    /// Returns an error if the record does not exist or the store rejects it.
    #[instrument(skip(self, fields, files), fields(files = files.len()))]
    pub async fn update_multipart(
        &self,
        collection: &str,
        id: &str,
        fields: &Map<String, Value>,
        files: &[FileUpload],
    ) -> Result<Record, StoreError> {
        let url = self.records_url(collection, Some(id))?;
        let response = self
            .send(|client| Ok(client.patch(url.clone()).multipart(multipart_form(fields, files)?)))
            .await?;
        decode(response).await
    }

    /// Public URL of a file attached to a record.
    #[must_use]
    pub fn file_url(&self, collection: &str, record_id: &str, filename: &str) -> String {
        file_url(self.inner.base.as_str(), collection, record_id, filename)
    }

    // =========================================================================
    // Transport
    // =========================================================================

    fn records_url(&self, collection: &str, id: Option<&str>) -> Result<Url, StoreError> {
        let mut url = self.inner.base.join("api/collections/")?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| StoreError::Parse("store URL cannot be a base".to_string()))?;
            segments.pop_if_empty().push(collection).push("records");
            if let Some(id) = id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    /// Send a request with the admin token, re-authenticating once on 401.
    async fn send<F>(&self, build: F) -> Result<reqwest::Response, StoreError>
    where
        F: Fn(&reqwest::Client) -> Result<reqwest::RequestBuilder, StoreError> + Send + Sync,
    {
        let response = self.send_once(&build).await?;
        if response.status() != reqwest::StatusCode::UNAUTHORIZED
            || self.inner.credentials.is_none()
        {
            return Ok(response);
        }

        tracing::warn!("Record store rejected token, re-authenticating");
        self.authenticate().await?;
        self.send_once(&build).await
    }

    async fn send_once<F>(&self, build: &F) -> Result<reqwest::Response, StoreError>
    where
        F: Fn(&reqwest::Client) -> Result<reqwest::RequestBuilder, StoreError> + Send + Sync,
    {
        let mut request = build(&self.inner.client)?;
        if let Some(token) = self.inner.token.read().await.as_ref() {
            request = request.header(reqwest::header::AUTHORIZATION, token.expose_secret());
        }
        Ok(request.send().await?)
    }
}

#[async_trait::async_trait]
impl RecordStore for RecordStoreClient {
    #[instrument(skip(self, query), fields(page = query.page, per_page = query.per_page))]
    async fn list(&self, collection: &str, query: &ListQuery) -> Result<Page, StoreError> {
        let mut url = self.records_url(collection, None)?;
        url.query_pairs_mut().extend_pairs(query.to_pairs());
        let response = self.send(|client| Ok(client.get(url.clone()))).await?;
        decode(response).await
    }

    #[instrument(skip(self))]
    async fn get(&self, collection: &str, id: &str) -> Result<Record, StoreError> {
        let url = self.records_url(collection, Some(id))?;
        let response = self.send(|client| Ok(client.get(url.clone()))).await?;
        decode(response).await
    }

    #[instrument(skip(self, fields))]
    async fn create(&self, collection: &str, fields: &Value) -> Result<Record, StoreError> {
        let url = self.records_url(collection, None)?;
        let response = self
            .send(|client| Ok(client.post(url.clone()).json(fields)))
            .await?;
        decode(response).await
    }

    #[instrument(skip(self, fields))]
    async fn update(&self, collection: &str, id: &str, fields: &Value) -> Result<Record, StoreError> {
        let url = self.records_url(collection, Some(id))?;
        let response = self
            .send(|client| Ok(client.patch(url.clone()).json(fields)))
            .await?;
        decode(response).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let url = self.records_url(collection, Some(id))?;
        let response = self.send(|client| Ok(client.delete(url.clone()))).await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::from_status(status.as_u16(), &body))
    }
}

impl std::fmt::Debug for RecordStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStoreClient")
            .field("base", &self.inner.base.as_str())
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// Decode a JSON body or map the error status.
async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, StoreError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| StoreError::Parse(format!("Failed to parse response: {e}")));
    }

    let body = response.text().await.unwrap_or_default();
    Err(StoreError::from_status(status.as_u16(), &body))
}

/// Build a multipart body: scalar fields as text parts, lists repeated per value.
fn multipart_form(fields: &Map<String, Value>, files: &[FileUpload]) -> Result<Form, StoreError> {
    let mut form = Form::new();
    for (key, value) in fields {
        match value {
            Value::Null => {}
            Value::String(s) => form = form.text(key.clone(), s.clone()),
            Value::Array(items) => {
                for item in items {
                    let text = item
                        .as_str()
                        .map_or_else(|| item.to_string(), String::from);
                    form = form.text(key.clone(), text);
                }
            }
            other => form = form.text(key.clone(), other.to_string()),
        }
    }
    for file in files {
        let mut part = Part::bytes(file.data.clone()).file_name(file.filename.clone());
        if let Some(content_type) = &file.content_type {
            part = part.mime_str(content_type)?;
        }
        form = form.part(file.field.clone(), part);
    }
    Ok(form)
}

/// Ensure the base URL ends with `/` so relative joins keep its path.
fn normalize_base(url: &str) -> Result<Url, StoreError> {
    let trimmed = url.trim();
    if trimmed.ends_with('/') {
        Ok(Url::parse(trimmed)?)
    } else {
        Ok(Url::parse(&format!("{trimmed}/"))?)
    }
}

/// `{base}/api/files/{collection}/{record_id}/{filename}`, each part
/// percent-encoded as a single path segment.
#[must_use]
pub fn file_url(base: &str, collection: &str, record_id: &str, filename: &str) -> String {
    let Ok(mut url) = normalize_base(base) else {
        return format!(
            "{}/api/files/{collection}/{record_id}/{filename}",
            base.trim_end_matches('/')
        );
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments
            .pop_if_empty()
            .extend(["api", "files", collection, record_id, filename]);
    }
    url.into()
}

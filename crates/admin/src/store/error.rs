use thiserror::Error;

use super::types::ApiErrorBody;

/// Field error code the store uses for unique-index violations.
pub const NOT_UNIQUE_CODE: &str = "validation_not_unique";

/// Errors that can occur when talking to the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP request failed (connection refused, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Store URL could not be built.
    #[error("Invalid store URL: {0}")]
    Url(#[from] url::ParseError),

    /// Record or collection does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Credentials rejected or token expired.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Token valid but the rule denies access.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A unique field already holds this value.
    #[error("Value of {field} is not unique")]
    Conflict { field: String },

    /// Request rejected by record validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Any other non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Response body could not be decoded.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl StoreError {
    /// Map a non-success status and its body to an error.
    pub(crate) fn from_status(status: u16, body: &str) -> Self {
        let parsed: ApiErrorBody = serde_json::from_str(body).unwrap_or_default();
        let message = if parsed.message.is_empty() {
            body.trim().to_string()
        } else {
            parsed.summary()
        };

        match status {
            400 => parsed
                .field_codes()
                .into_iter()
                .find(|(_, code)| code == NOT_UNIQUE_CODE)
                .map_or(Self::Validation(message), |(field, _)| Self::Conflict {
                    field,
                }),
            401 => Self::Unauthorized(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            _ => Self::Api { status, message },
        }
    }

    /// Whether this is a uniqueness conflict on `field`.
    #[must_use]
    pub fn is_conflict_on(&self, field: &str) -> bool {
        matches!(self, Self::Conflict { field: f } if f == field)
    }

    /// Whether the store was unreachable or answered with a server error.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Http(_)) || matches!(self, Self::Api { status, .. } if *status >= 500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_not_unique() {
        let body = r#"{"code":400,"message":"Failed to create record.","data":{"customer_id":{"code":"validation_not_unique","message":"Value must be unique."}}}"#;
        let err = StoreError::from_status(400, body);
        assert!(err.is_conflict_on("customer_id"));
        assert!(!err.is_conflict_on("product_id"));
    }

    #[test]
    fn test_from_status_validation() {
        let body = r#"{"code":400,"message":"Failed to create record.","data":{"name":{"code":"validation_required","message":"Missing required value."}}}"#;
        let err = StoreError::from_status(400, body);
        assert!(matches!(err, StoreError::Validation(ref m) if m.contains("name: Missing required value.")));
    }

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(
            StoreError::from_status(401, "{}"),
            StoreError::Unauthorized(_)
        ));
        assert!(matches!(
            StoreError::from_status(403, ""),
            StoreError::Forbidden(_)
        ));
        assert!(matches!(
            StoreError::from_status(404, r#"{"message":"The requested resource wasn't found."}"#),
            StoreError::NotFound(ref m) if m == "The requested resource wasn't found."
        ));
        let err = StoreError::from_status(502, "bad gateway");
        assert!(matches!(err, StoreError::Api { status: 502, ref message } if message == "bad gateway"));
        assert!(err.is_unavailable());
    }
}

//! Record store wire types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default page size used when paging through a whole collection.
pub const FULL_LIST_PAGE_SIZE: u32 = 200;

/// A record from any collection.
///
/// System fields are typed; everything else stays as JSON so the same type
/// serves customers, products, inquiries and reminders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default, rename = "collectionName", skip_serializing_if = "Option::is_none")]
    pub collection_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Raw field value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// A string field, treating blank strings as absent.
    #[must_use]
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// A string field or `""`.
    #[must_use]
    pub fn text(&self, field: &str) -> &str {
        self.str_field(field).unwrap_or_default()
    }

    /// A boolean field; absent or non-boolean values are `false`.
    #[must_use]
    pub fn bool_field(&self, field: &str) -> bool {
        match self.fields.get(field) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    /// A non-negative integer field; absent or unreadable values are 0.
    #[must_use]
    pub fn u32_field(&self, field: &str) -> u32 {
        match self.fields.get(field) {
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or_default(),
            Some(Value::String(s)) => s.trim().parse().unwrap_or_default(),
            _ => 0,
        }
    }

    /// A relation or file field that may hold one value or a list.
    #[must_use]
    pub fn list_field(&self, field: &str) -> Vec<String> {
        match self.fields.get(field) {
            Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// An expanded relation, as requested with `expand=field`.
    #[must_use]
    pub fn expanded(&self, field: &str) -> Vec<Self> {
        let Some(value) = self.fields.get("expand").and_then(|e| e.get(field)) else {
            return Vec::new();
        };
        match value {
            Value::Array(items) => items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect(),
            other => serde_json::from_value(other.clone())
                .map(|record| vec![record])
                .unwrap_or_default(),
        }
    }
}

/// One page of a list response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
    pub items: Vec<Record>,
}

/// Query parameters for listing records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub expand: Option<String>,
    pub page: u32,
    pub per_page: u32,
}

impl ListQuery {
    /// First page with the store's default page size.
    #[must_use]
    pub fn new() -> Self {
        Self {
            page: 1,
            per_page: 30,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Set the filter only when one is given.
    #[must_use]
    pub fn maybe_filter(mut self, filter: Option<impl Into<String>>) -> Self {
        self.filter = filter.map(Into::into);
        self
    }

    #[must_use]
    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    #[must_use]
    pub fn expand(mut self, expand: impl Into<String>) -> Self {
        self.expand = Some(expand.into());
        self
    }

    /// Page number, clamped to at least 1.
    #[must_use]
    pub fn page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    /// Page size, clamped to at least 1.
    #[must_use]
    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    /// Query-string pairs in store parameter names.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("page", self.page.to_string()),
            ("perPage", self.per_page.to_string()),
        ];
        if let Some(filter) = &self.filter {
            pairs.push(("filter", filter.clone()));
        }
        if let Some(sort) = &self.sort {
            pairs.push(("sort", sort.clone()));
        }
        if let Some(expand) = &self.expand {
            pairs.push(("expand", expand.clone()));
        }
        pairs
    }
}

/// A file to attach to a record in a multipart create/update.
#[derive(Debug, Clone)]
pub struct FileUpload {
    /// Record field the file belongs to (e.g. `uploaded_docs`).
    pub field: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Error body returned by the store on 4xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl ApiErrorBody {
    /// Per-field error codes, e.g. `("customer_id", "validation_not_unique")`.
    #[must_use]
    pub fn field_codes(&self) -> Vec<(String, String)> {
        self.data
            .iter()
            .filter_map(|(field, detail)| {
                detail
                    .get("code")
                    .and_then(Value::as_str)
                    .map(|code| (field.clone(), code.to_string()))
            })
            .collect()
    }

    /// Human-readable summary including field messages.
    #[must_use]
    pub fn summary(&self) -> String {
        let details: Vec<String> = self
            .data
            .iter()
            .filter_map(|(field, detail)| {
                detail
                    .get("message")
                    .and_then(Value::as_str)
                    .map(|message| format!("{field}: {message}"))
            })
            .collect();
        if details.is_empty() {
            self.message.clone()
        } else {
            format!("{} ({})", self.message, details.join(", "))
        }
    }
}

/// A staff user returned by password authentication.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub token: secrecy::SecretString,
    pub record: Record,
}

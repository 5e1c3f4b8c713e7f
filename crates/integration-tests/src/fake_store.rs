//! In-process fake of the record store REST API.
//!
//! Supports admin and user password auth, bearer-token checks, record CRUD
//! with JSON bodies, unique fields, `page`/`perPage`/`sort` and the filter
//! grammar the back office emits (`=`, `~`, `>=`, `&&`, `||`, parentheses).

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{Duration, Utc};
use rbl_admin::config::RecordStoreConfig;
use rbl_admin::store::RecordStoreClient;
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::{Map, Value, json};

pub const ADMIN_EMAIL: &str = "store-admin@rblsourcing.com";
pub const ADMIN_PASSWORD: &str = "store-admin-password";

const DEFAULT_PER_PAGE: usize = 30;

#[derive(Default)]
struct Inner {
    collections: HashMap<String, Vec<Map<String, Value>>>,
    unique: HashSet<(String, String)>,
    /// Records another writer slips in right before the next create.
    pending_inserts: HashMap<String, Vec<Map<String, Value>>>,
    failing: HashSet<String>,
    token: Option<String>,
    admin_logins: u32,
    next_record: i64,
}

impl Inner {
    fn insert(&mut self, collection: &str, mut fields: Map<String, Value>) -> Map<String, Value> {
        self.next_record += 1;
        let created = (Utc::now() + Duration::milliseconds(self.next_record))
            .format("%Y-%m-%d %H:%M:%S%.3fZ")
            .to_string();
        fields
            .entry("id")
            .or_insert_with(|| json!(format!("rec{:012}", self.next_record)));
        fields.insert("collectionName".into(), json!(collection));
        fields.entry("created").or_insert_with(|| json!(created));
        fields.insert("updated".into(), json!(created));
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(fields.clone());
        fields
    }

    fn find(&self, collection: &str, id: &str) -> Option<&Map<String, Value>> {
        self.collections
            .get(collection)?
            .iter()
            .find(|r| r.get("id").and_then(Value::as_str) == Some(id))
    }

    fn find_mut(&mut self, collection: &str, id: &str) -> Option<&mut Map<String, Value>> {
        self.collections
            .get_mut(collection)?
            .iter_mut()
            .find(|r| r.get("id").and_then(Value::as_str) == Some(id))
    }

    /// First unique field of `fields` already held by another record.
    fn conflict(&self, collection: &str, fields: &Map<String, Value>, own_id: Option<&str>) -> Option<String> {
        let records = self.collections.get(collection)?;
        self.unique
            .iter()
            .filter(|(c, _)| c == collection)
            .map(|(_, field)| field)
            .find(|field| {
                let Some(value) = fields.get(field.as_str()).filter(|v| !is_blank(v)) else {
                    return false;
                };
                records.iter().any(|r| {
                    r.get(field.as_str()) == Some(value)
                        && r.get("id").and_then(Value::as_str) != own_id
                })
            })
            .cloned()
    }
}

/// Fake record store listening on `127.0.0.1`.
#[derive(Clone)]
pub struct FakeRecordStore {
    inner: Arc<Mutex<Inner>>,
    addr: SocketAddr,
}

impl FakeRecordStore {
    /// Start the fake on an ephemeral port.
    ///
    /// # Panics
    ///
    /// Panics if no local port can be bound.
    pub async fn start() -> Self {
        let inner = Arc::new(Mutex::new(Inner::default()));
        let app = Router::new()
            .route("/api/health", get(health))
            .route("/api/admins/auth-with-password", post(admin_auth))
            .route("/api/collections/{collection}/auth-with-password", post(user_auth))
            .route(
                "/api/collections/{collection}/request-password-reset",
                post(password_reset),
            )
            .route(
                "/api/collections/{collection}/records",
                get(list_records).post(create_record),
            )
            .route(
                "/api/collections/{collection}/records/{id}",
                get(get_record).patch(update_record).delete(delete_record),
            )
            .with_state(Arc::clone(&inner));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake record store");
        let addr = listener.local_addr().expect("Failed to read local address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { inner, addr }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("fake store lock poisoned")
    }

    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Connection settings with the fake's admin credentials.
    #[must_use]
    pub fn config(&self) -> RecordStoreConfig {
        RecordStoreConfig {
            url: self.url(),
            admin_email: ADMIN_EMAIL.to_string(),
            admin_password: SecretString::from(ADMIN_PASSWORD),
        }
    }

    /// A client configured for this fake. Not yet authenticated.
    ///
    /// # Panics
    ///
    /// Panics if the client cannot be built.
    #[must_use]
    pub fn client(&self) -> RecordStoreClient {
        RecordStoreClient::new(&self.config()).expect("Failed to build record store client")
    }

    /// Store a record directly and return its id.
    ///
    /// # Panics
    ///
    /// Panics if `fields` is not a JSON object.
    pub fn insert(&self, collection: &str, fields: Value) -> String {
        let Value::Object(fields) = fields else {
            panic!("record fields must be a JSON object");
        };
        let record = self.lock().insert(collection, fields);
        record["id"].as_str().unwrap_or_default().to_string()
    }

    /// Add a staff user that can log in with `password`.
    pub fn add_staff(&self, email: &str, password: &str, role: &str) -> String {
        self.insert(
            "users",
            json!({ "email": email, "name": email, "role": role, "password": password }),
        )
    }

    /// Every record of `collection`, in insertion order.
    #[must_use]
    pub fn records(&self, collection: &str) -> Vec<Value> {
        self.lock()
            .collections
            .get(collection)
            .map(|records| records.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn record(&self, collection: &str, id: &str) -> Option<Value> {
        self.lock().find(collection, id).cloned().map(Value::Object)
    }

    /// Reject creates that repeat a value of `field`.
    pub fn unique(&self, collection: &str, field: &str) {
        self.lock()
            .unique
            .insert((collection.to_string(), field.to_string()));
    }

    /// Insert `fields` just before the next create on `collection` is handled.
    ///
    /// # Panics
    ///
    /// Panics if `fields` is not a JSON object.
    pub fn insert_before_next_create(&self, collection: &str, fields: Value) {
        let Value::Object(fields) = fields else {
            panic!("record fields must be a JSON object");
        };
        self.lock()
            .pending_inserts
            .entry(collection.to_string())
            .or_default()
            .push(fields);
    }

    /// Answer every request on `collection` with a 500.
    pub fn fail(&self, collection: &str) {
        self.lock().failing.insert(collection.to_string());
    }

    /// Invalidate the issued admin token.
    pub fn expire_token(&self) {
        self.lock().token = None;
    }

    /// Number of successful admin logins.
    #[must_use]
    pub fn admin_logins(&self) -> u32 {
        self.lock().admin_logins
    }
}

type Shared = State<Arc<Mutex<Inner>>>;

fn lock(inner: &Arc<Mutex<Inner>>) -> MutexGuard<'_, Inner> {
    inner.lock().expect("fake store lock poisoned")
}

fn error(status: StatusCode, message: &str, data: Value) -> Response {
    (
        status,
        Json(json!({ "code": status.as_u16(), "message": message, "data": data })),
    )
        .into_response()
}

fn not_found() -> Response {
    error(
        StatusCode::NOT_FOUND,
        "The requested resource wasn't found.",
        json!({}),
    )
}

/// Check the bearer token and the failure switch for `collection`.
fn guard(inner: &Inner, headers: &HeaderMap, collection: &str) -> Result<(), Response> {
    let presented = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    if inner.token.is_none() || presented != inner.token.as_deref() {
        return Err(error(
            StatusCode::UNAUTHORIZED,
            "The request requires valid admin authorization token to be set.",
            json!({}),
        ));
    }
    if inner.failing.contains(collection) {
        return Err(error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Something went wrong while processing your request.",
            json!({}),
        ));
    }
    Ok(())
}

/// Record as returned to clients.
fn public(record: &Map<String, Value>) -> Value {
    let mut record = record.clone();
    record.remove("password");
    Value::Object(record)
}

/// Auth-collection password rules: a password needs a matching
/// `passwordConfirm`, which is never stored.
fn confirm_password(
    collection: &str,
    fields: &mut Map<String, Value>,
    creating: bool,
) -> Result<(), Response> {
    if collection != "users" {
        return Ok(());
    }
    let confirm = fields.remove("passwordConfirm");
    match fields.get("password") {
        None if creating => Err(error(
            StatusCode::BAD_REQUEST,
            "Failed to create record.",
            json!({ "password": { "code": "validation_required", "message": "Missing required value." } }),
        )),
        Some(password) if confirm.as_ref() != Some(password) => Err(error(
            StatusCode::BAD_REQUEST,
            "Failed to save record.",
            json!({ "passwordConfirm": { "code": "validation_values_mismatch", "message": "Values don't match." } }),
        )),
        _ => Ok(()),
    }
}

fn is_blank(value: &Value) -> bool {
    matches!(value, Value::Null) || value.as_str().is_some_and(str::is_empty)
}

async fn health() -> Json<Value> {
    Json(json!({ "code": 200, "message": "API is healthy." }))
}

#[derive(Deserialize)]
struct AuthBody {
    identity: String,
    password: String,
}

fn failed_auth() -> Response {
    error(StatusCode::BAD_REQUEST, "Failed to authenticate.", json!({}))
}

async fn admin_auth(State(inner): Shared, Json(body): Json<AuthBody>) -> Response {
    if body.identity != ADMIN_EMAIL || body.password != ADMIN_PASSWORD {
        return failed_auth();
    }
    let mut inner = lock(&inner);
    inner.admin_logins += 1;
    let token = format!("admin-token-{}", inner.admin_logins);
    inner.token = Some(token.clone());
    Json(json!({ "token": token, "admin": { "id": "admin1", "email": ADMIN_EMAIL } })).into_response()
}

async fn user_auth(
    State(inner): Shared,
    Path(collection): Path<String>,
    Json(body): Json<AuthBody>,
) -> Response {
    let inner = lock(&inner);
    let user = inner.collections.get(&collection).and_then(|users| {
        users.iter().find(|u| {
            u.get("email").and_then(Value::as_str) == Some(body.identity.as_str())
                && u.get("password").and_then(Value::as_str) == Some(body.password.as_str())
        })
    });
    match user {
        Some(user) => Json(json!({ "token": "user-token", "record": public(user) })).into_response(),
        None => failed_auth(),
    }
}

async fn password_reset() -> StatusCode {
    StatusCode::NO_CONTENT
}

#[derive(Deserialize)]
struct ListParams {
    page: Option<usize>,
    #[serde(rename = "perPage")]
    per_page: Option<usize>,
    filter: Option<String>,
    sort: Option<String>,
}

async fn list_records(
    State(inner): Shared,
    Path(collection): Path<String>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Response {
    let inner = lock(&inner);
    if let Err(response) = guard(&inner, &headers, &collection) {
        return response;
    }

    let expr = match params.filter.as_deref().filter(|f| !f.trim().is_empty()) {
        Some(raw) => match filter::parse(raw) {
            Ok(expr) => Some(expr),
            Err(message) => {
                return error(
                    StatusCode::BAD_REQUEST,
                    "Something went wrong while processing your request. Invalid filter.",
                    json!({ "filter": message }),
                );
            }
        },
        None => None,
    };

    let mut matching: Vec<&Map<String, Value>> = inner
        .collections
        .get(&collection)
        .map(|records| {
            records
                .iter()
                .filter(|r| expr.as_ref().is_none_or(|e| e.matches(r)))
                .collect()
        })
        .unwrap_or_default();

    if let Some(sort) = params.sort.as_deref().filter(|s| !s.is_empty()) {
        let (field, descending) = sort
            .strip_prefix('-')
            .map_or((sort, false), |field| (field, true));
        matching.sort_by_key(|r| filter::texts(r, field).join(","));
        if descending {
            matching.reverse();
        }
    }

    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(DEFAULT_PER_PAGE).max(1);
    let total_items = matching.len();
    let items: Vec<Value> = matching
        .into_iter()
        .skip((page - 1) * per_page)
        .take(per_page)
        .map(public)
        .collect();

    Json(json!({
        "page": page,
        "perPage": per_page,
        "totalItems": total_items,
        "totalPages": total_items.div_ceil(per_page),
        "items": items,
    }))
    .into_response()
}

async fn create_record(
    State(inner): Shared,
    Path(collection): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut inner = lock(&inner);
    if let Err(response) = guard(&inner, &headers, &collection) {
        return response;
    }
    let Value::Object(mut fields) = body else {
        return error(StatusCode::BAD_REQUEST, "Failed to create record.", json!({}));
    };
    if let Err(response) = confirm_password(&collection, &mut fields, true) {
        return response;
    }

    if let Some(pending) = inner.pending_inserts.get_mut(&collection).filter(|p| !p.is_empty()) {
        let concurrent = pending.remove(0);
        inner.insert(&collection, concurrent);
    }

    if let Some(field) = inner.conflict(&collection, &fields, None) {
        return error(
            StatusCode::BAD_REQUEST,
            "Failed to create record.",
            json!({ field: { "code": "validation_not_unique", "message": "Value must be unique." } }),
        );
    }

    Json(public(&inner.insert(&collection, fields))).into_response()
}

async fn get_record(
    State(inner): Shared,
    Path((collection, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let inner = lock(&inner);
    if let Err(response) = guard(&inner, &headers, &collection) {
        return response;
    }
    inner
        .find(&collection, &id)
        .map_or_else(not_found, |record| Json(public(record)).into_response())
}

async fn update_record(
    State(inner): Shared,
    Path((collection, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut inner = lock(&inner);
    if let Err(response) = guard(&inner, &headers, &collection) {
        return response;
    }
    let Value::Object(mut fields) = body else {
        return error(StatusCode::BAD_REQUEST, "Failed to update record.", json!({}));
    };
    if let Err(response) = confirm_password(&collection, &mut fields, false) {
        return response;
    }
    if let Some(field) = inner.conflict(&collection, &fields, Some(&id)) {
        return error(
            StatusCode::BAD_REQUEST,
            "Failed to update record.",
            json!({ field: { "code": "validation_not_unique", "message": "Value must be unique." } }),
        );
    }

    let Some(record) = inner.find_mut(&collection, &id) else {
        return not_found();
    };
    for (key, value) in fields {
        record.insert(key, value);
    }
    Json(public(record)).into_response()
}

async fn delete_record(
    State(inner): Shared,
    Path((collection, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let mut inner = lock(&inner);
    if let Err(response) = guard(&inner, &headers, &collection) {
        return response;
    }
    let Some(records) = inner.collections.get_mut(&collection) else {
        return not_found();
    };
    let before = records.len();
    records.retain(|r| r.get("id").and_then(Value::as_str) != Some(id.as_str()));
    if records.len() == before {
        return not_found();
    }
    StatusCode::NO_CONTENT.into_response()
}

/// Evaluation of store filter expressions.
mod filter {
    use serde_json::{Map, Value};

    #[derive(Debug)]
    pub enum Expr {
        Compare { field: String, op: String, value: String },
        And(Box<Expr>, Box<Expr>),
        Or(Box<Expr>, Box<Expr>),
    }

    impl Expr {
        pub fn matches(&self, record: &Map<String, Value>) -> bool {
            match self {
                Self::And(a, b) => a.matches(record) && b.matches(record),
                Self::Or(a, b) => a.matches(record) || b.matches(record),
                Self::Compare { field, op, value } => {
                    let texts = texts(record, field);
                    match op.as_str() {
                        "=" => texts.iter().any(|t| t == value),
                        "!=" => texts.iter().all(|t| t != value),
                        "~" => {
                            let needle = value.to_lowercase();
                            texts.iter().any(|t| t.to_lowercase().contains(&needle))
                        }
                        ">=" => texts.iter().any(|t| t.as_str() >= value.as_str()),
                        ">" => texts.iter().any(|t| t.as_str() > value.as_str()),
                        "<=" => texts.iter().any(|t| t.as_str() <= value.as_str()),
                        "<" => texts.iter().any(|t| t.as_str() < value.as_str()),
                        _ => false,
                    }
                }
            }
        }
    }

    /// A field as comparable strings; relation lists yield one per element.
    pub fn texts(record: &Map<String, Value>, field: &str) -> Vec<String> {
        match record.get(field) {
            None | Some(Value::Null) => vec![String::new()],
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| v.as_str().map_or_else(|| v.to_string(), String::from))
                .collect(),
            Some(other) => vec![other.to_string()],
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Token {
        Open,
        Close,
        And,
        Or,
        Ident(String),
        Op(String),
        Str(String),
    }

    fn tokenize(input: &str) -> Result<Vec<Token>, String> {
        let mut tokens = Vec::new();
        let mut chars = input.chars().peekable();
        while let Some(&c) = chars.peek() {
            match c {
                c if c.is_whitespace() => {
                    chars.next();
                }
                '(' => {
                    chars.next();
                    tokens.push(Token::Open);
                }
                ')' => {
                    chars.next();
                    tokens.push(Token::Close);
                }
                '&' | '|' => {
                    chars.next();
                    if chars.next() != Some(c) {
                        return Err(format!("expected {c}{c}"));
                    }
                    tokens.push(if c == '&' { Token::And } else { Token::Or });
                }
                '"' => {
                    chars.next();
                    let mut value = String::new();
                    loop {
                        match chars.next() {
                            Some('\\') => value.push(chars.next().ok_or("dangling escape")?),
                            Some('"') => break,
                            Some(ch) => value.push(ch),
                            None => return Err("unterminated string".to_string()),
                        }
                    }
                    tokens.push(Token::Str(value));
                }
                '=' | '~' | '>' | '<' | '!' => {
                    let mut op = String::new();
                    while let Some(&ch) = chars.peek() {
                        if !matches!(ch, '=' | '~' | '>' | '<' | '!') {
                            break;
                        }
                        op.push(ch);
                        chars.next();
                    }
                    tokens.push(Token::Op(op));
                }
                c if c.is_alphanumeric() || c == '_' || c == '.' => {
                    let mut ident = String::new();
                    while let Some(&ch) = chars.peek() {
                        if !(ch.is_alphanumeric() || ch == '_' || ch == '.') {
                            break;
                        }
                        ident.push(ch);
                        chars.next();
                    }
                    tokens.push(Token::Ident(ident));
                }
                other => return Err(format!("unexpected character {other:?}")),
            }
        }
        Ok(tokens)
    }

    pub fn parse(input: &str) -> Result<Expr, String> {
        let tokens = tokenize(input)?;
        let mut pos = 0;
        let expr = parse_expr(&tokens, &mut pos)?;
        if pos == tokens.len() {
            Ok(expr)
        } else {
            Err(format!("unexpected token at {pos}"))
        }
    }

    fn parse_expr(tokens: &[Token], pos: &mut usize) -> Result<Expr, String> {
        let mut left = parse_term(tokens, pos)?;
        loop {
            match tokens.get(*pos) {
                Some(Token::And) => {
                    *pos += 1;
                    left = Expr::And(Box::new(left), Box::new(parse_term(tokens, pos)?));
                }
                Some(Token::Or) => {
                    *pos += 1;
                    left = Expr::Or(Box::new(left), Box::new(parse_term(tokens, pos)?));
                }
                _ => return Ok(left),
            }
        }
    }

    fn parse_term(tokens: &[Token], pos: &mut usize) -> Result<Expr, String> {
        match tokens.get(*pos) {
            Some(Token::Open) => {
                *pos += 1;
                let inner = parse_expr(tokens, pos)?;
                if tokens.get(*pos) != Some(&Token::Close) {
                    return Err("missing )".to_string());
                }
                *pos += 1;
                Ok(inner)
            }
            Some(Token::Ident(field)) => {
                let (Some(Token::Op(op)), Some(Token::Str(value))) =
                    (tokens.get(*pos + 1), tokens.get(*pos + 2))
                else {
                    return Err(format!("incomplete comparison on {field}"));
                };
                *pos += 3;
                Ok(Expr::Compare {
                    field: field.clone(),
                    op: op.clone(),
                    value: value.clone(),
                })
            }
            other => Err(format!("unexpected {other:?}")),
        }
    }

    #[cfg(test)]
    #[allow(clippy::unwrap_used)]
    mod tests {
        use serde_json::json;

        use super::*;

        fn record(value: Value) -> Map<String, Value> {
            value.as_object().cloned().unwrap_or_default()
        }

        #[test]
        fn test_grouped_filter() {
            let expr = parse(r#"role = "staff" && (name ~ "O\"BR" || email ~ "x")"#).unwrap();
            assert!(expr.matches(&record(json!({ "role": "staff", "name": "o\"brien" }))));
            assert!(!expr.matches(&record(json!({ "role": "admin", "name": "o\"brien" }))));
        }

        #[test]
        fn test_relation_list_contains() {
            let expr = parse(r#"supplier ~ "sup1""#).unwrap();
            assert!(expr.matches(&record(json!({ "supplier": ["sup0", "sup1"] }))));
            assert!(!expr.matches(&record(json!({ "supplier": [] }))));
        }

        #[test]
        fn test_rejects_garbage() {
            assert!(parse("name ~").is_err());
            assert!(parse(r#"(name = "a""#).is_err());
        }
    }
}

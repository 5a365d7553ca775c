//! Integration tests for Pokébolsa.
//!
//! Fakes for every external collaborator:
//!
//! - [`FakeCartStore`] - in-memory [`CartStore`] that records each call with
//!   its (tokio) timestamp
//! - [`ScriptedSource`] - catalog source that fails a set number of times,
//!   or never answers
//! - [`FakeParse`] - an axum server speaking enough of the Parse REST API
//!   (classes, `/login`, `/users`) plus a card search endpoint
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p pokebolsa-integration-tests
//! ```

#![allow(clippy::missing_panics_doc, clippy::must_use_candidate)]

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use pokebolsa_core::{Cart, Price, Product, ProductId, RecordId, SessionId};
use pokebolsa_storefront::cart_store::{
    CartReadError, CartStore, RemoteCartRecord, RemoteWriteError,
};
use pokebolsa_storefront::catalog::{CatalogSource, SourceError};
use pokebolsa_storefront::config::ParseConfig;
use pokebolsa_storefront::parse::ParseClient;
use secrecy::SecretString;
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use url::Url;

pub const APP_ID: &str = "pokebolsa-test";
pub const REST_KEY: &str = "rest-key-for-tests";

const CREATED_AT: &str = "2024-05-01T12:00:00.000Z";

/// A product with a readable name and the given price in cents.
pub fn product(id: &str, cents: u32) -> Product {
    Product {
        id: ProductId::new(id),
        name: format!("Card {id}"),
        unit_price: Price::from_cents(cents),
        description: "Mega Evolution".to_string(),
        image_url: Some(format!("https://images.test/{id}.png")),
    }
}

// =============================================================================
// FakeCartStore
// =============================================================================

#[derive(Debug, Clone)]
pub enum CartCall {
    Find {
        session_id: SessionId,
    },
    Create {
        at: Instant,
        session_id: SessionId,
        cart: Cart,
    },
    Update {
        at: Instant,
        record_id: RecordId,
        cart: Cart,
    },
}

/// In-memory cart store.
#[derive(Debug, Default)]
pub struct FakeCartStore {
    records: Mutex<Vec<RemoteCartRecord>>,
    calls: Mutex<Vec<CartCall>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    next_id: AtomicU32,
    write_latency: Duration,
}

impl FakeCartStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every create/update takes `latency` before answering.
    pub fn with_write_latency(latency: Duration) -> Self {
        Self {
            write_latency: latency,
            ..Self::default()
        }
    }

    pub async fn seed(&self, record: RemoteCartRecord) {
        self.records.lock().await.push(record);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub async fn calls(&self) -> Vec<CartCall> {
        self.calls.lock().await.clone()
    }

    /// Only creates and updates.
    pub async fn writes(&self) -> Vec<CartCall> {
        self.calls()
            .await
            .into_iter()
            .filter(|call| !matches!(call, CartCall::Find { .. }))
            .collect()
    }

    pub async fn records(&self) -> Vec<RemoteCartRecord> {
        self.records.lock().await.clone()
    }

    async fn write_delay(&self) {
        if !self.write_latency.is_zero() {
            tokio::time::sleep(self.write_latency).await;
        }
    }
}

#[async_trait]
impl CartStore for FakeCartStore {
    async fn find_by_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<RemoteCartRecord>, CartReadError> {
        self.calls.lock().await.push(CartCall::Find {
            session_id: session_id.clone(),
        });
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CartReadError::Unavailable("store offline".to_string()));
        }
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .find(|record| &record.session_id == session_id)
            .cloned())
    }

    async fn create(
        &self,
        session_id: &SessionId,
        cart: &Cart,
    ) -> Result<RecordId, RemoteWriteError> {
        self.calls.lock().await.push(CartCall::Create {
            at: Instant::now(),
            session_id: session_id.clone(),
            cart: cart.clone(),
        });
        self.write_delay().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RemoteWriteError::Unavailable("store offline".to_string()));
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record_id = RecordId::new(format!("rec{n}"));
        self.records.lock().await.push(RemoteCartRecord {
            record_id: record_id.clone(),
            session_id: session_id.clone(),
            cart: cart.clone(),
        });
        Ok(record_id)
    }

    async fn update(&self, record_id: &RecordId, cart: &Cart) -> Result<(), RemoteWriteError> {
        self.calls.lock().await.push(CartCall::Update {
            at: Instant::now(),
            record_id: record_id.clone(),
            cart: cart.clone(),
        });
        self.write_delay().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RemoteWriteError::Unavailable("store offline".to_string()));
        }

        let mut records = self.records.lock().await;
        let record = records
            .iter_mut()
            .find(|record| &record.record_id == record_id)
            .ok_or_else(|| RemoteWriteError::Unavailable(format!("no record {record_id}")))?;
        record.cart = cart.clone();
        Ok(())
    }
}

// =============================================================================
// ScriptedSource
// =============================================================================

/// Catalog source with a fixed script of failures.
#[derive(Debug)]
pub struct ScriptedSource {
    remaining_failures: AtomicU32,
    hang: bool,
    products: Vec<Product>,
    attempts: Mutex<Vec<Instant>>,
}

impl ScriptedSource {
    /// Fail `failures` times, then return `products`.
    pub fn failing_then(failures: u32, products: Vec<Product>) -> Self {
        Self {
            remaining_failures: AtomicU32::new(failures),
            hang: false,
            products,
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// Never answers.
    pub fn hanging() -> Self {
        Self {
            remaining_failures: AtomicU32::new(0),
            hang: true,
            products: Vec::new(),
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// When each attempt started.
    pub async fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().await.clone()
    }
}

#[async_trait]
impl CatalogSource for ScriptedSource {
    fn cache_key(&self) -> String {
        "scripted".to_string()
    }

    async fn fetch(&self) -> Result<Vec<Product>, SourceError> {
        self.attempts.lock().await.push(Instant::now());
        if self.hang {
            std::future::pending::<()>().await;
        }

        let failed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(SourceError::Status(503));
        }
        Ok(self.products.clone())
    }
}

// =============================================================================
// FakeParse
// =============================================================================

#[derive(Debug, Default)]
struct Backend {
    classes: BTreeMap<String, Vec<Map<String, Value>>>,
    users: Vec<Map<String, Value>>,
    next_id: u64,
    cards: Value,
    card_failures: u32,
    card_queries: Vec<HashMap<String, String>>,
}

impl Backend {
    fn next_object_id(&mut self) -> String {
        self.next_id += 1;
        format!("obj{:04}", self.next_id)
    }
}

type Shared = Arc<Mutex<Backend>>;

/// An axum server faking the Parse REST API under `/parse` and a card
/// search API under `/cards`.
pub struct FakeParse {
    addr: SocketAddr,
    state: Shared,
    server: JoinHandle<()>,
}

impl FakeParse {
    pub async fn start() -> Self {
        let state = Shared::default();

        let parse = Router::new()
            .route("/classes/{class}", get(query_class).post(create_object))
            .route(
                "/classes/{class}/{id}",
                get(get_object).put(update_object).delete(delete_object),
            )
            .route("/login", get(login))
            .route("/users", axum::routing::post(sign_up))
            .route_layer(middleware::from_fn(require_keys));

        let app = Router::new()
            .nest("/parse", parse)
            .route("/cards", get(search_cards))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind listener");
        let addr = listener.local_addr().expect("listener address");
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve app");
        });

        Self {
            addr,
            state,
            server,
        }
    }

    pub fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}/parse/", self.addr)).expect("base url")
    }

    pub fn cards_url(&self) -> Url {
        Url::parse(&format!("http://{}/cards", self.addr)).expect("cards url")
    }

    pub fn config(&self) -> ParseConfig {
        ParseConfig {
            base_url: self.base_url(),
            app_id: APP_ID.to_string(),
            rest_key: SecretString::from(REST_KEY),
        }
    }

    pub fn client(&self) -> ParseClient {
        ParseClient::new(&self.config()).expect("parse client")
    }

    pub async fn add_user(&self, username: &str, password: &str, email: &str) -> String {
        let mut backend = self.state.lock().await;
        let object_id = backend.next_object_id();
        let user = json!({
            "objectId": object_id,
            "username": username,
            "password": password,
            "email": email,
            "createdAt": CREATED_AT,
        });
        if let Value::Object(user) = user {
            backend.users.push(user);
        }
        object_id
    }

    pub async fn users(&self) -> Vec<Value> {
        let backend = self.state.lock().await;
        backend.users.iter().cloned().map(Value::Object).collect()
    }

    /// Insert an object as-is and return its id.
    pub async fn insert_object(&self, class: &str, object: Value) -> String {
        let mut backend = self.state.lock().await;
        let object_id = backend.next_object_id();
        let mut object = match object {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        object.insert("objectId".to_string(), json!(object_id));
        backend
            .classes
            .entry(class.to_string())
            .or_default()
            .push(object);
        object_id
    }

    pub async fn objects(&self, class: &str) -> Vec<Value> {
        let backend = self.state.lock().await;
        backend
            .classes
            .get(class)
            .into_iter()
            .flatten()
            .cloned()
            .map(Value::Object)
            .collect()
    }

    /// Body of `GET /cards`, wrapped as `{ "data": cards }`.
    pub async fn set_cards(&self, cards: Value) {
        self.state.lock().await.cards = cards;
    }

    /// The next `n` card requests answer 503.
    pub async fn fail_card_requests(&self, n: u32) {
        self.state.lock().await.card_failures = n;
    }

    /// Query strings of every card request so far.
    pub async fn card_queries(&self) -> Vec<HashMap<String, String>> {
        self.state.lock().await.card_queries.clone()
    }
}

impl Drop for FakeParse {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn parse_error(status: StatusCode, code: i64, message: &str) -> Response {
    (status, Json(json!({ "code": code, "error": message }))).into_response()
}

async fn require_keys(request: Request, next: Next) -> Response {
    let authorized = {
        let headers = request.headers();
        let header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());
        header("x-parse-application-id") == Some(APP_ID)
            && header("x-parse-rest-api-key") == Some(REST_KEY)
    };

    if !authorized {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthorized" })))
            .into_response();
    }
    next.run(request).await
}

async fn query_class(
    State(state): State<Shared>,
    Path(class): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let filter = match params.get("where").map(|raw| serde_json::from_str::<Value>(raw)) {
        None => Map::new(),
        Some(Ok(Value::Object(filter))) => filter,
        Some(_) => return parse_error(StatusCode::BAD_REQUEST, 102, "Invalid where clause"),
    };

    let backend = state.lock().await;
    let results: Vec<Value> = backend
        .classes
        .get(&class)
        .into_iter()
        .flatten()
        .filter(|object| filter.iter().all(|(key, value)| object.get(key) == Some(value)))
        .cloned()
        .map(Value::Object)
        .collect();
    Json(json!({ "results": results })).into_response()
}

async fn create_object(
    State(state): State<Shared>,
    Path(class): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let Value::Object(mut object) = body else {
        return parse_error(StatusCode::BAD_REQUEST, 107, "Invalid JSON");
    };

    let mut backend = state.lock().await;
    let object_id = backend.next_object_id();
    object.insert("objectId".to_string(), json!(object_id));
    object.insert("createdAt".to_string(), json!(CREATED_AT));
    backend.classes.entry(class).or_default().push(object);

    (
        StatusCode::CREATED,
        Json(json!({ "objectId": object_id, "createdAt": CREATED_AT })),
    )
        .into_response()
}

async fn get_object(
    State(state): State<Shared>,
    Path((class, id)): Path<(String, String)>,
) -> Response {
    let backend = state.lock().await;
    backend
        .classes
        .get(&class)
        .and_then(|objects| {
            objects
                .iter()
                .find(|object| object.get("objectId") == Some(&json!(id)))
        })
        .map_or_else(
            || parse_error(StatusCode::NOT_FOUND, 101, "Object not found."),
            |object| Json(Value::Object(object.clone())).into_response(),
        )
}

async fn update_object(
    State(state): State<Shared>,
    Path((class, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    let mut backend = state.lock().await;
    let object = backend.classes.get_mut(&class).and_then(|objects| {
        objects
            .iter_mut()
            .find(|object| object.get("objectId") == Some(&json!(id)))
    });

    match (object, body) {
        (Some(object), Value::Object(fields)) => {
            object.extend(fields);
            Json(json!({ "updatedAt": CREATED_AT })).into_response()
        }
        (Some(_), _) => parse_error(StatusCode::BAD_REQUEST, 107, "Invalid JSON"),
        (None, _) => parse_error(StatusCode::NOT_FOUND, 101, "Object not found."),
    }
}

async fn delete_object(
    State(state): State<Shared>,
    Path((class, id)): Path<(String, String)>,
) -> Response {
    let mut backend = state.lock().await;
    let Some(objects) = backend.classes.get_mut(&class) else {
        return parse_error(StatusCode::NOT_FOUND, 101, "Object not found.");
    };
    let before = objects.len();
    objects.retain(|object| object.get("objectId") != Some(&json!(id)));
    if objects.len() == before {
        return parse_error(StatusCode::NOT_FOUND, 101, "Object not found.");
    }
    Json(json!({})).into_response()
}

async fn login(
    State(state): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let username = params.get("username").map(String::as_str);
    let password = params.get("password").map(String::as_str);

    let backend = state.lock().await;
    let user = backend.users.iter().find(|user| {
        user.get("username").and_then(Value::as_str) == username
            && user.get("password").and_then(Value::as_str) == password
    });

    let Some(user) = user else {
        return parse_error(StatusCode::NOT_FOUND, 101, "Invalid username/password.");
    };

    let mut body = user.clone();
    body.remove("password");
    let token = format!(
        "r:token-{}",
        body.get("objectId").and_then(Value::as_str).unwrap_or_default()
    );
    body.insert("sessionToken".to_string(), json!(token));
    Json(Value::Object(body)).into_response()
}

async fn sign_up(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let Value::Object(mut user) = body else {
        return parse_error(StatusCode::BAD_REQUEST, 107, "Invalid JSON");
    };

    let mut backend = state.lock().await;
    let taken = backend
        .users
        .iter()
        .any(|existing| existing.get("username") == user.get("username"));
    if taken {
        return parse_error(
            StatusCode::BAD_REQUEST,
            202,
            "Account already exists for this username.",
        );
    }

    let object_id = backend.next_object_id();
    user.insert("objectId".to_string(), json!(object_id));
    user.insert("createdAt".to_string(), json!(CREATED_AT));
    backend.users.push(user);

    (
        StatusCode::CREATED,
        Json(json!({
            "objectId": object_id,
            "createdAt": CREATED_AT,
            "sessionToken": format!("r:token-{object_id}"),
        })),
    )
        .into_response()
}

async fn search_cards(
    State(state): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mut backend = state.lock().await;
    backend.card_queries.push(params);

    if backend.card_failures > 0 {
        backend.card_failures -= 1;
        return (StatusCode::SERVICE_UNAVAILABLE, "try again later").into_response();
    }
    Json(json!({ "data": backend.cards })).into_response()
}

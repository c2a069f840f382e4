//! End-to-end checks of the request pipeline against a local axum server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::routing::{delete, get, post, put};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use voyage::config::{ClientConfig, Timeouts};
use voyage::net::{ApiClient, ApiError, ApiEvent, ApiRequest, Credentials, EventSink, MemoryTokenStore, Navigator, TokenStore};
use voyage::state::SessionStore;

// =============================================================================
// MOCK BACKEND
// =============================================================================

const ADMIN_TOKEN: &str = "tok-admin";

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()).map(str::to_owned)
}

async fn echo_auth(headers: HeaderMap) -> Json<Value> {
    Json(json!({ "authorization": bearer(&headers) }))
}

async fn login(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["username"] == "admin" && body["password"] == "pw" {
        (
            StatusCode::OK,
            Json(json!({
                "message": "Login successful",
                "token": ADMIN_TOKEN,
                "user": { "user_id": 1, "username": "admin", "user_type": "admin" }
            })),
        )
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Invalid username or password" })))
    }
}

async fn check_auth(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if bearer(&headers).as_deref() == Some("Bearer tok-admin") {
        (StatusCode::OK, Json(json!({ "user": { "user_id": 1, "username": "admin", "user_type": "admin" } })))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "msg": "Token has expired" })))
    }
}

async fn logout() -> Json<Value> {
    Json(json!({ "message": "Logged out successfully." }))
}

async fn trips(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    Json(json!({ "passenger_id": params.get("passenger_id") }))
}

async fn edit(Json(body): Json<Value>) -> Json<Value> {
    Json(json!({ "updated": body }))
}

async fn remove() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn boom() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "database unavailable")
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(5)).await;
    Json(json!({}))
}

/// Serve one connection: read the request head, answer with `head` and a
/// body shorter than its `Content-Length`, then hang up.
async fn spawn_truncated(head: &'static str) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut chunk = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&chunk[..n]);
        }
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(b"{\"ms").await.unwrap();
        socket.shutdown().await.unwrap();
    });
    format!("http://{addr}")
}

async fn spawn_backend() -> String {
    let app = Router::new()
        .route("/echo-auth", get(echo_auth))
        .route("/api/login", post(login))
        .route("/api/check-auth", get(check_auth))
        .route("/logout", post(logout))
        .route("/api/trip", get(trips))
        .route("/api/passenger/1/edit", put(edit))
        .route("/api/admin/manage_users", delete(remove))
        .route("/boom", get(boom))
        .route("/slow", get(slow));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

// =============================================================================
// RECORDERS
// =============================================================================

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<ApiEvent>>,
    redirects: Mutex<Vec<String>>,
}

impl Recorder {
    fn events(&self) -> Vec<ApiEvent> {
        self.events.lock().unwrap().clone()
    }

    fn redirects(&self) -> Vec<String> {
        self.redirects.lock().unwrap().clone()
    }
}

impl EventSink for Recorder {
    fn record(&self, event: &ApiEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

impl Navigator for Recorder {
    fn redirect(&self, path: &str) {
        self.redirects.lock().unwrap().push(path.to_owned());
    }
}

struct Harness {
    client: Arc<ApiClient>,
    tokens: Arc<MemoryTokenStore>,
    recorder: Arc<Recorder>,
}

fn harness(base_url: &str, token: Option<&str>, request_secs: u64) -> Harness {
    let config = ClientConfig {
        base_url: base_url.to_owned(),
        timeouts: Timeouts { request_secs, connect_secs: 1 },
        ..ClientConfig::default()
    };
    let tokens = Arc::new(token.map_or_else(MemoryTokenStore::new, MemoryTokenStore::with_token));
    let recorder = Arc::new(Recorder::default());
    let client = ApiClient::builder(&config)
        .token_store(tokens.clone())
        .event_sink(recorder.clone())
        .navigator(recorder.clone())
        .build()
        .unwrap();
    Harness { client: Arc::new(client), tokens, recorder }
}

// =============================================================================
// REQUEST STAGE
// =============================================================================

#[tokio::test]
async fn stored_token_is_sent_as_bearer() {
    let base = spawn_backend().await;
    let h = harness(&base, Some("abc"), 10);
    let payload: Value = h.client.get("/echo-auth", None).await.unwrap();
    assert_eq!(payload, json!({ "authorization": "Bearer abc" }));
}

#[tokio::test]
async fn missing_token_sends_no_authorization() {
    let base = spawn_backend().await;
    let h = harness(&base, None, 10);
    let payload: Value = h.client.get("/echo-auth", None).await.unwrap();
    assert_eq!(payload, json!({ "authorization": null }));
}

#[tokio::test]
async fn request_and_response_events_share_an_id() {
    let base = spawn_backend().await;
    let h = harness(&base, None, 10);
    let _: Value = h.client.get("/echo-auth", None).await.unwrap();
    let events = h.recorder.events();
    assert!(matches!(
        &events[..],
        [ApiEvent::RequestSent { .. }, ApiEvent::ResponseReceived { status: 200, .. }]
    ));
    assert_eq!(events[0].request_id(), events[1].request_id());
}

// =============================================================================
// HELPERS
// =============================================================================

#[tokio::test]
async fn get_encodes_params() {
    let base = spawn_backend().await;
    let h = harness(&base, None, 10);
    let payload: Value = h.client.get("/api/trip", Some(&json!({ "passenger_id": 5 }))).await.unwrap();
    assert_eq!(payload, json!({ "passenger_id": "5" }));
}

#[tokio::test]
async fn put_sends_json_body() {
    let base = spawn_backend().await;
    let h = harness(&base, None, 10);
    let payload: Value = h.client.put("/api/passenger/1/edit", &json!({ "phone": "555" })).await.unwrap();
    assert_eq!(payload, json!({ "updated": { "phone": "555" } }));
}

#[tokio::test]
async fn delete_with_empty_body_yields_null() {
    let base = spawn_backend().await;
    let h = harness(&base, None, 10);
    let payload: Value = h.client.delete("/api/admin/manage_users").await.unwrap();
    assert_eq!(payload, Value::Null);
}

// =============================================================================
// RESPONSE STAGE ERRORS
// =============================================================================

#[tokio::test]
async fn server_error_propagates_without_redirect() {
    let base = spawn_backend().await;
    let h = harness(&base, None, 10);
    let err = h.client.get::<Value>("/boom", None).await.unwrap_err();
    assert_eq!(err, ApiError::Server { status: 500, body: "database unavailable".into() });
    assert!(h.recorder.redirects().is_empty());
}

#[tokio::test]
async fn unauthorized_redirects_to_login_once() {
    let base = spawn_backend().await;
    let h = harness(&base, Some("expired"), 10);
    let err = h.client.get::<Value>("/api/check-auth", None).await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(h.recorder.redirects(), vec!["/login".to_owned()]);
    let unauthorized = h.recorder.events().into_iter().filter(|e| matches!(e, ApiEvent::Unauthorized { .. })).count();
    assert_eq!(unauthorized, 1);
}

#[tokio::test]
async fn unauthorized_with_truncated_body_still_redirects() {
    let base = spawn_truncated("HTTP/1.1 401 Unauthorized\r\nContent-Type: application/json\r\nContent-Length: 100\r\n\r\n").await;
    let h = harness(&base, Some("expired"), 5);
    let err = h.client.get::<Value>("/api/check-auth", None).await.unwrap_err();
    assert!(err.is_unauthorized(), "got {err:?}");
    assert_eq!(h.recorder.redirects(), vec!["/login".to_owned()]);
    assert!(h.recorder.events().iter().any(|e| matches!(e, ApiEvent::Unauthorized { .. })));
}

#[tokio::test]
async fn success_with_truncated_body_is_network_error() {
    let base = spawn_truncated("HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 100\r\n\r\n").await;
    let h = harness(&base, None, 5);
    let err = h.client.get::<Value>("/api/trip", None).await.unwrap_err();
    assert!(matches!(err, ApiError::Network(_)), "got {err:?}");
    assert!(h.recorder.redirects().is_empty());
}

#[tokio::test]
async fn timeout_is_network_error() {
    let base = spawn_backend().await;
    let h = harness(&base, None, 1);
    let err = h.client.get::<Value>("/slow", None).await.unwrap_err();
    assert!(matches!(err, ApiError::Network(_)), "got {err:?}");
    assert!(h.recorder.events().iter().any(|e| matches!(e, ApiEvent::NoResponse { .. })));
}

#[tokio::test]
async fn connection_refused_is_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let h = harness(&format!("http://{addr}"), None, 2);
    let err = h.client.get::<Value>("/echo-auth", None).await.unwrap_err();
    assert!(matches!(err, ApiError::Network(_)), "got {err:?}");
}

#[tokio::test]
async fn cancellation_abandons_slow_request() {
    let base = spawn_backend().await;
    let h = harness(&base, None, 10);
    let err = h
        .client
        .send_until::<Value, _>(ApiRequest::get("/slow"), tokio::time::sleep(Duration::from_millis(100)))
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::Cancelled);
}

// =============================================================================
// SESSION STORE OVER HTTP
// =============================================================================

#[tokio::test]
async fn login_stores_token_and_sets_admin() {
    let base = spawn_backend().await;
    let h = harness(&base, None, 10);
    let store = SessionStore::new(h.client.clone());

    assert!(store.login(&Credentials::new("admin", "pw")).await);
    assert!(store.is_admin());
    assert_eq!(h.tokens.load().unwrap().as_deref(), Some(ADMIN_TOKEN));

    store.check_login_status().await;
    assert!(store.is_admin());
}

#[tokio::test]
async fn rejected_login_returns_false_and_keeps_state() {
    let base = spawn_backend().await;
    let h = harness(&base, None, 10);
    let store = SessionStore::new(h.client.clone());
    let before = store.snapshot();

    assert!(!store.login(&Credentials::new("admin", "wrong")).await);
    assert_eq!(store.snapshot(), before);
    assert_eq!(h.tokens.load().unwrap(), None);
}

#[tokio::test]
async fn expired_session_check_clears_user_and_redirects_once() {
    let base = spawn_backend().await;
    let h = harness(&base, Some("expired"), 10);
    let store = SessionStore::new(h.client.clone());
    store.set_user(Some(voyage::net::User::with_role("admin")));

    store.check_login_status().await;

    assert!(store.user().is_none());
    assert!(!store.is_authenticated());
    assert_eq!(h.recorder.redirects().len(), 1);
}

#[tokio::test]
async fn unreachable_session_check_clears_without_redirect() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let h = harness(&format!("http://{addr}"), Some(ADMIN_TOKEN), 2);
    let store = SessionStore::new(h.client.clone());
    store.set_user(Some(voyage::net::User::with_role("user")));

    store.check_login_status().await;

    assert!(!store.is_authenticated());
    assert!(h.recorder.redirects().is_empty());
}

#[tokio::test]
async fn logout_forgets_token() {
    let base = spawn_backend().await;
    let h = harness(&base, Some(ADMIN_TOKEN), 10);
    let store = SessionStore::new(h.client.clone());
    store.check_login_status().await;
    assert!(store.is_admin());

    store.logout().await.unwrap();
    assert!(!store.is_authenticated());
    assert_eq!(h.tokens.load().unwrap(), None);
}

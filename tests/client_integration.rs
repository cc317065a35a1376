use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
    Json, Router,
};
use dashapi_http::{
    resources, ApiClient, ApiConfig, ApiError, CancellationToken, ClientOptions, MemoryStore,
    Navigator, Notifier, SessionError, SessionSource, SessionTokenProvider, Token, TokenProvider,
    AUTH_TOKEN_KEY,
};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

#[derive(Clone)]
struct MockResponse {
    status: StatusCode,
    body: JsonValue,
    delay: Duration,
}

impl MockResponse {
    fn json(status: StatusCode, body: JsonValue) -> Self {
        Self {
            status,
            body,
            delay: Duration::from_millis(0),
        }
    }

    fn ok(body: JsonValue) -> Self {
        Self::json(StatusCode::OK, body)
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Hit {
    target: String,
    authorization: Option<String>,
    content_type: Option<String>,
    body: String,
}

#[derive(Clone)]
struct MockState {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    hits: Arc<AtomicUsize>,
    log: Arc<Mutex<Vec<Hit>>>,
}

async fn api_handler(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);

    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
    };
    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| uri.path().to_owned());
    state
        .log
        .lock()
        .expect("hit log mutex must not be poisoned")
        .push(Hit {
            target: format!("{method} {target}"),
            authorization: header_value(header::AUTHORIZATION),
            content_type: header_value(header::CONTENT_TYPE),
            body,
        });

    let response = {
        let mut queue = state
            .responses
            .lock()
            .expect("response queue mutex must not be poisoned");
        queue.pop_front().unwrap_or_else(|| {
            MockResponse::json(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"message": "no mock response available"}),
            )
        })
    };

    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    (response.status, Json(response.body))
}

struct TestServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
    log: Arc<Mutex<Vec<Hit>>>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn log(&self) -> Vec<Hit> {
        self.log.lock().expect("hit log mutex").clone()
    }

    fn config(&self) -> ApiConfig {
        ApiConfig::new(&self.base_url).expect("mock base url must be valid")
    }
}

async fn spawn_server(responses: Vec<MockResponse>) -> TestServer {
    let state = MockState {
        responses: Arc::new(Mutex::new(responses.into())),
        hits: Arc::new(AtomicUsize::new(0)),
        log: Arc::new(Mutex::new(Vec::new())),
    };

    let app = Router::new()
        .fallback(api_handler)
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("mock server must run");
    });

    TestServer {
        base_url: format!("http://{address}"),
        hits: state.hits,
        log: state.log,
        task,
    }
}

/// Base URL of a port nothing listens on.
async fn closed_base_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind throwaway listener");
    let address = listener.local_addr().expect("must have local addr");
    drop(listener);
    format!("http://{address}")
}

#[derive(Default)]
struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    fn messages(&self) -> Vec<String> {
        self.messages.lock().expect("notifier mutex").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify_error(&self, message: &str) {
        self.messages
            .lock()
            .expect("notifier mutex")
            .push(message.to_owned());
    }
}

#[derive(Default)]
struct RecordingNavigator {
    paths: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    fn paths(&self) -> Vec<String> {
        self.paths.lock().expect("navigator mutex").clone()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, path: &str) {
        self.paths
            .lock()
            .expect("navigator mutex")
            .push(path.to_owned());
    }
}

struct Harness {
    api: ApiClient,
    notifier: Arc<RecordingNotifier>,
    navigator: Arc<RecordingNavigator>,
}

fn fast_options(max_retries: u32) -> ClientOptions {
    ClientOptions {
        timeout_ms: 1_000,
        max_retries,
        retry_backoff_ms: 1,
        max_backoff_ms: 10,
        jitter: false,
    }
}

fn harness(config: ApiConfig, options: ClientOptions) -> Harness {
    let notifier = Arc::new(RecordingNotifier::default());
    let navigator = Arc::new(RecordingNavigator::default());
    let api = ApiClient::new(config)
        .with_options(options)
        .with_bearer("abc123")
        .with_notifier(notifier.clone())
        .with_navigator(navigator.clone());
    Harness {
        api,
        notifier,
        navigator,
    }
}

#[derive(Debug, Deserialize, PartialEq)]
struct Project {
    id: u32,
    name: String,
}

#[tokio::test]
async fn get_decodes_json_and_sends_default_headers() {
    let server = spawn_server(vec![MockResponse::ok(
        json!([{ "id": 1, "name": "Launch" }]),
    )])
    .await;
    let h = harness(server.config(), fast_options(3));

    let response = h.api.get("/projects").await.expect("get must succeed");
    let projects: Vec<Project> = response.json().expect("body must decode");

    assert_eq!(
        projects,
        vec![Project {
            id: 1,
            name: "Launch".to_owned()
        }]
    );
    assert_eq!(response.attempts, 1);

    let log = server.log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].target, "GET /projects");
    assert_eq!(log[0].authorization.as_deref(), Some("Bearer abc123"));
    assert_eq!(log[0].content_type.as_deref(), Some("application/json"));
}

#[tokio::test]
async fn recovers_after_two_network_failures() {
    let slow = MockResponse::ok(json!({})).with_delay(Duration::from_millis(400));
    let server = spawn_server(vec![
        slow.clone(),
        slow,
        MockResponse::ok(json!([{ "id": 2, "name": "Docs" }])),
    ])
    .await;
    let h = harness(
        server.config(),
        ClientOptions {
            timeout_ms: 100,
            retry_backoff_ms: 50,
            max_backoff_ms: 1_000,
            ..fast_options(3)
        },
    );

    let started = Instant::now();
    let response = h.api.get("/projects").await.expect("third attempt must succeed");
    let elapsed = started.elapsed();

    assert_eq!(response.attempts, 3);
    assert_eq!(server.hits(), 3);
    // two timeouts (2 x 100 ms) plus backoffs of 100 ms and 200 ms
    assert!(elapsed >= Duration::from_millis(500), "elapsed {elapsed:?}");
    let projects: Vec<Project> = response.json().expect("body must decode");
    assert_eq!(projects[0].id, 2);
    assert!(h.notifier.messages().is_empty());
    assert!(h.navigator.paths().is_empty());
}

#[tokio::test]
async fn every_retry_carries_the_bearer_token() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::INTERNAL_SERVER_ERROR, json!({})),
        MockResponse::json(StatusCode::BAD_GATEWAY, json!({})),
        MockResponse::ok(json!({ "id": 9 })),
    ])
    .await;
    let h = harness(server.config(), fast_options(3));

    let response = h
        .api
        .post("/api/transactions", &json!({ "amount": 42 }))
        .await
        .expect("request must succeed after retries");

    assert_eq!(response.attempts, 3);
    let log = server.log();
    assert_eq!(log.len(), 3);
    for hit in &log {
        assert_eq!(hit.target, "POST /api/transactions");
        assert_eq!(hit.authorization.as_deref(), Some("Bearer abc123"));
        assert_eq!(hit.body, r#"{"amount":42}"#);
    }
}

#[tokio::test]
async fn unauthorized_redirects_once_without_retry() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::UNAUTHORIZED,
        json!({ "message": "Session expired" }),
    )])
    .await;
    let h = harness(server.config().with_login_path("/sign-in"), fast_options(3));

    let err = h.api.get("/api/wallets").await.expect_err("401 must reject");

    assert!(matches!(err, ApiError::Unauthorized { .. }));
    assert_eq!(err.status(), Some(401));
    assert_eq!(server.hits(), 1);
    assert_eq!(h.navigator.paths(), vec!["/sign-in".to_owned()]);
    assert!(h.notifier.messages().is_empty());
}

#[tokio::test]
async fn exhausted_retries_notify_exactly_once() {
    let failing = MockResponse::json(
        StatusCode::SERVICE_UNAVAILABLE,
        json!({ "message": "Service unavailable" }),
    );
    let server = spawn_server(vec![failing; 4]).await;
    let h = harness(server.config(), fast_options(3));

    let err = h.api.get("/projects").await.expect_err("must give up");

    match err {
        ApiError::RetriesExhausted { attempts, source } => {
            assert_eq!(attempts, 4);
            assert!(matches!(*source, ApiError::Http { status: 503, .. }));
        }
        other => panic!("expected exhausted retries, got {other:?}"),
    }
    assert_eq!(server.hits(), 4);
    assert_eq!(h.notifier.messages(), vec!["Service unavailable".to_owned()]);
    assert!(h.navigator.paths().is_empty());
}

#[tokio::test]
async fn rate_limited_is_not_retried() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::TOO_MANY_REQUESTS,
        json!({ "message": "Slow down" }),
    )])
    .await;
    let h = harness(server.config(), fast_options(3));

    let err = h.api.get("/api/budgets").await.expect_err("429 must reject");

    assert!(matches!(err, ApiError::RateLimited { .. }));
    assert_eq!(server.hits(), 1);
    assert_eq!(h.notifier.messages(), vec!["Slow down".to_owned()]);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::NOT_FOUND,
        json!({ "error": "missing" }),
    )])
    .await;
    let h = harness(server.config(), fast_options(3));

    let err = h.api.get("/api/wallets/99").await.expect_err("404 must reject");

    assert!(matches!(err, ApiError::Http { status: 404, .. }));
    assert_eq!(server.hits(), 1);
    assert_eq!(h.notifier.messages(), vec!["An error occurred".to_owned()]);
}

#[tokio::test]
async fn connection_refused_is_retried_then_surfaced() {
    let config = ApiConfig::new(closed_base_url().await).expect("valid url");
    let h = harness(config, fast_options(2));

    let err = h.api.get("/projects").await.expect_err("nothing listens");

    match err {
        ApiError::RetriesExhausted { attempts, source } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*source, ApiError::Transport(_)));
        }
        other => panic!("expected exhausted retries, got {other:?}"),
    }
    assert_eq!(
        h.notifier.messages(),
        vec!["No response received from the server".to_owned()]
    );
}

#[tokio::test]
async fn request_timeout_surfaces_transport_error() {
    let server = spawn_server(vec![
        MockResponse::ok(json!({})).with_delay(Duration::from_millis(150))
    ])
    .await;
    let h = harness(
        server.config(),
        ClientOptions {
            timeout_ms: 20,
            ..fast_options(0)
        },
    );

    let err = h.api.delete("/tasks/1").await.expect_err("request must timeout");

    match err {
        ApiError::RetriesExhausted { attempts, source } => {
            assert_eq!(attempts, 1);
            match *source {
                ApiError::Transport(inner) => assert!(inner.is_timeout()),
                other => panic!("expected transport timeout error, got {other:?}"),
            }
        }
        other => panic!("expected exhausted retries, got {other:?}"),
    }
}

#[tokio::test]
async fn cancellation_aborts_pending_backoff_silently() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({}),
    )])
    .await;
    let h = harness(
        server.config(),
        ClientOptions {
            retry_backoff_ms: 5_000,
            max_backoff_ms: 10_000,
            ..fast_options(3)
        },
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let request = dashapi_http::ApiRequest::get("/projects");
    let err = h
        .api
        .send_with_cancellation(&request, &cancel)
        .await
        .expect_err("call must be cancelled");

    assert!(matches!(err, ApiError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(server.hits(), 1);
    assert!(h.notifier.messages().is_empty());
    assert!(h.navigator.paths().is_empty());
}

struct HangingTokens;

#[async_trait]
impl TokenProvider for HangingTokens {
    async fn get_token(&self) -> Option<Token> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn hanging_token_provider_sends_without_authorization() {
    let server = spawn_server(vec![MockResponse::ok(json!({ "ok": true }))]).await;
    let h = harness(
        server.config(),
        ClientOptions {
            timeout_ms: 100,
            ..fast_options(0)
        },
    );
    let api = h.api.with_token_provider(Arc::new(HangingTokens));

    api.get("/users/me").await.expect("request must still go out");

    let log = server.log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].authorization, None);
}

#[tokio::test]
async fn resource_helpers_build_paths_queries_and_bodies() {
    let server = spawn_server(vec![
        MockResponse::ok(json!([{ "id": 1, "name": "Groceries" }])),
        MockResponse::ok(json!({ "id": 5, "name": "Write docs" })),
        MockResponse::ok(json!({ "id": 5, "name": "Write more docs" })),
        MockResponse::ok(json!({})),
    ])
    .await;
    let h = harness(server.config(), fast_options(0));

    let budgets: Vec<Project> = h
        .api
        .resource(resources::BUDGETS)
        .list_with_query([("month", "2024-05")])
        .await
        .expect("list must succeed");
    assert_eq!(budgets.len(), 1);

    let tasks = h.api.resource(resources::PROJECTS).nested(7, "tasks");
    let created: Project = tasks
        .create(&json!({ "name": "Write docs" }))
        .await
        .expect("create must succeed");
    assert_eq!(created.id, 5);

    let updated: Project = tasks
        .patch(5, &json!({ "name": "Write more docs" }))
        .await
        .expect("patch must succeed");
    assert_eq!(updated.name, "Write more docs");

    tasks.delete(5).await.expect("delete must succeed");

    let targets: Vec<String> = server.log().into_iter().map(|hit| hit.target).collect();
    assert_eq!(
        targets,
        vec![
            "GET /api/budgets?month=2024-05".to_owned(),
            "POST /projects/7/tasks".to_owned(),
            "PATCH /projects/7/tasks/5".to_owned(),
            "DELETE /projects/7/tasks/5".to_owned(),
        ]
    );
}

#[tokio::test]
async fn base_url_path_prefix_is_kept() {
    let server = spawn_server(vec![MockResponse::ok(json!([]))]).await;
    let config = ApiConfig::new(format!("{}/v1/", server.base_url)).expect("valid url");
    let h = harness(config, fast_options(0));

    let wallets: Vec<JsonValue> = h
        .api
        .resource(resources::WALLETS)
        .list()
        .await
        .expect("list must succeed");

    assert!(wallets.is_empty());
    assert_eq!(server.log()[0].target, "GET /v1/api/wallets");
}

#[tokio::test]
async fn check_connection_reports_root_message() {
    let server = spawn_server(vec![MockResponse::ok(
        json!({ "message": "API is running" }),
    )])
    .await;
    let h = harness(server.config(), fast_options(3));

    let status = h.api.check_connection().await;

    assert!(status.connected);
    assert_eq!(status.message.as_deref(), Some("API is running"));
    assert_eq!(status.error, None);
    assert_eq!(server.log()[0].target, "GET /");
}

#[tokio::test]
async fn check_connection_reports_unreachable_server_without_hooks() {
    let config = ApiConfig::new(closed_base_url().await).expect("valid url");
    let h = harness(config, fast_options(3));

    let status = h.api.check_connection().await;

    assert!(!status.connected);
    assert_eq!(
        status.error.as_deref(),
        Some("No response received from the server")
    );
    assert!(h.notifier.messages().is_empty());
}

struct HangingSession;

#[async_trait]
impl SessionSource for HangingSession {
    async fn current_token(&self) -> Result<Option<String>, SessionError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn hanging_session_falls_back_to_stored_token() {
    let server = spawn_server(vec![MockResponse::ok(json!([]))]).await;
    let store = MemoryStore::new();
    store.insert(AUTH_TOKEN_KEY, "stored-token");
    let tokens = SessionTokenProvider::new()
        .with_session(Arc::new(HangingSession))
        .with_store(Arc::new(store))
        .with_session_timeout(Duration::from_millis(50));
    let h = harness(
        server.config(),
        ClientOptions {
            timeout_ms: 500,
            ..fast_options(0)
        },
    );
    let api = h.api.with_token_provider(Arc::new(tokens));

    api.get("/projects").await.expect("request must succeed");

    let log = server.log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].authorization.as_deref(), Some("Bearer stored-token"));
}

#[tokio::test]
async fn invalid_header_token_is_dropped_and_request_still_sent() {
    let server = spawn_server(vec![MockResponse::ok(json!([]))]).await;
    let h = harness(server.config(), fast_options(0));
    let api = h.api.with_bearer("abc\u{7}def");

    api.get("/projects")
        .await
        .expect("request must go out without authorization");

    let log = server.log();
    assert_eq!(server.hits(), 1);
    assert_eq!(log[0].authorization, None);
    assert!(h.notifier.messages().is_empty());
}

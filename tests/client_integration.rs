use std::{
    collections::VecDeque,
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri},
    Router,
};
use finwise::{
    ClientConfig, ClientOptions, ErrorKind, FinwiseClient, FinwiseError, RequestExecutor, Sleeper,
};
use serde_json::{json, Value as JsonValue};

#[derive(Clone)]
struct MockResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
    delay: Duration,
}

impl MockResponse {
    fn json(status: StatusCode, body: JsonValue) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.to_string(),
            delay: Duration::from_millis(0),
        }
    }

    fn empty(status: StatusCode) -> Self {
        Self {
            body: String::new(),
            ..Self::json(status, JsonValue::Null)
        }
    }

    fn with_header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.insert(name, HeaderValue::from_static(value));
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone, Debug)]
struct RecordedRequest {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: String,
}

#[derive(Clone)]
struct MockState {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    hits: Arc<AtomicUsize>,
}

async fn api_handler(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, HeaderMap, String) {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state
        .requests
        .lock()
        .expect("request log mutex must not be poisoned")
        .push(RecordedRequest {
            method,
            path: uri.path().to_owned(),
            query: uri.query().map(str::to_owned),
            headers,
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

    (response.status, response.headers, response.body)
}

struct TestServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl TestServer {
    fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .expect("request log mutex must not be poisoned")
            .clone()
    }

    fn options(&self, max_retries: u32) -> ClientOptions {
        ClientOptions {
            base_url: self.base_url.clone(),
            timeout_ms: 2_000,
            max_retries,
        }
    }
}

/// Runs the mock API on its own runtime thread so tests can drive the
/// blocking client from the test thread.
fn spawn_server(responses: Vec<MockResponse>) -> TestServer {
    let state = MockState {
        responses: Arc::new(Mutex::new(responses.into())),
        requests: Arc::new(Mutex::new(Vec::new())),
        hits: Arc::new(AtomicUsize::new(0)),
    };

    let app = Router::new().fallback(api_handler).with_state(state.clone());
    let (addr_tx, addr_rx) = std::sync::mpsc::channel::<SocketAddr>();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("must build test runtime");
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("must bind test listener");
            addr_tx
                .send(listener.local_addr().expect("must have local addr"))
                .expect("test must wait for address");
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("mock server must run");
        });
    });

    let address = addr_rx.recv().expect("mock server must report its address");
    TestServer {
        base_url: format!("http://{address}"),
        hits: state.hits,
        requests: state.requests,
        shutdown: Some(shutdown_tx),
    }
}

#[derive(Clone, Copy)]
struct NoSleep;

impl Sleeper for NoSleep {
    fn sleep(&self, _duration: Duration) {}
}

fn client_without_backoff(options: ClientOptions) -> FinwiseClient {
    let config = ClientConfig::new("test-api-key-12345", options).expect("valid config");
    let executor = RequestExecutor::new(config)
        .expect("must build executor")
        .with_sleeper(NoSleep);
    FinwiseClient::from_executor(executor)
}

fn sample_account() -> JsonValue {
    json!({
        "id": "acc_123abc",
        "name": "Test Savings Account",
        "type": "savings",
        "currency": "USD",
        "balance": 5000.00,
        "archivedAt": null
    })
}

#[test]
fn get_returns_response_document_and_sends_standard_headers() {
    let server = spawn_server(vec![MockResponse::json(StatusCode::OK, sample_account())]);
    let client = FinwiseClient::with_options("test-api-key-12345", server.options(3))
        .expect("valid client");

    let body = client.get("/accounts/acc_123abc", None).expect("get must succeed");

    assert_eq!(body, sample_account());
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);

    let requests = server.requests();
    let request = &requests[0];
    assert_eq!(request.method, Method::GET);
    assert_eq!(request.path, "/accounts/acc_123abc");
    assert_eq!(request.headers["authorization"], "test-api-key-12345");
    assert_eq!(request.headers["accept"], "application/json");
    assert_eq!(request.headers["content-type"], "application/json");
    let user_agent = request.headers["user-agent"].to_str().expect("ascii user agent");
    assert!(user_agent.starts_with("finwise-rust/"));
    let request_id = request.headers["request-id"].to_str().expect("ascii request id");
    assert_eq!(request_id.len(), 36);
}

#[test]
fn post_sends_json_body_and_get_sends_query() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::CREATED, sample_account()),
        MockResponse::json(StatusCode::OK, json!({"data": [], "pageNumber": 2})),
    ]);
    let client = FinwiseClient::with_options("key", server.options(0)).expect("valid client");

    let payload = json!({"name": "Emergency Fund", "type": "depository", "currency": "USD"});
    client
        .post("/accounts", Some(&payload), None)
        .expect("post must succeed");
    let query = vec![
        ("pageNumber".to_owned(), "2".to_owned()),
        ("pageSize".to_owned(), "50".to_owned()),
    ];
    client.get("/transactions", Some(&query)).expect("get must succeed");

    let requests = server.requests();
    assert_eq!(requests[0].method, Method::POST);
    let sent: JsonValue = serde_json::from_str(&requests[0].body).expect("json body");
    assert_eq!(sent, payload);
    assert_eq!(requests[1].query.as_deref(), Some("pageNumber=2&pageSize=50"));
}

#[test]
fn patch_and_delete_forward_query_parameters() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::OK, sample_account()),
        MockResponse::empty(StatusCode::NO_CONTENT),
    ]);
    let client = FinwiseClient::with_options("key", server.options(0)).expect("valid client");
    let query = vec![("dryRun".to_owned(), "true".to_owned())];

    client
        .patch("/accounts/acc_123abc", Some(&json!({"name": "Renamed"})), Some(&query))
        .expect("patch must succeed");
    client
        .delete("/accounts/acc_123abc", Some(&query))
        .expect("delete must succeed");

    let requests = server.requests();
    assert_eq!(requests[0].method, Method::PATCH);
    assert_eq!(requests[0].query.as_deref(), Some("dryRun=true"));
    assert_eq!(requests[1].method, Method::DELETE);
    assert_eq!(requests[1].query.as_deref(), Some("dryRun=true"));
}

#[test]
fn no_content_response_is_empty_document() {
    let server = spawn_server(vec![MockResponse::empty(StatusCode::NO_CONTENT)]);
    let client = FinwiseClient::with_options("key", server.options(0)).expect("valid client");

    let body = client
        .delete("/transaction-categories/cat_1", None)
        .expect("delete must succeed");

    assert_eq!(body, json!({}));
    assert_eq!(server.requests()[0].method, Method::DELETE);
}

#[test]
fn not_found_is_classified_without_retry() {
    let server = spawn_server(vec![MockResponse::json(
        StatusCode::NOT_FOUND,
        json!({"message": "Resource not found", "code": "NOT_FOUND", "errors": []}),
    )]);
    let client = FinwiseClient::with_options("key", server.options(3)).expect("valid client");

    let err = client.get("/accounts/missing", None).expect_err("get must fail");

    match &err {
        FinwiseError::NotFound(api) => {
            assert_eq!(api.status, 404);
            assert_eq!(api.message, "Resource not found");
            assert_eq!(api.code.as_deref(), Some("NOT_FOUND"));
        }
        other => panic!("expected not found, got {other:?}"),
    }
    let sent_id = server.requests()[0].headers["request-id"]
        .to_str()
        .expect("ascii request id")
        .to_owned();
    assert_eq!(err.request_id(), Some(sent_id.as_str()));
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[test]
fn rate_limit_is_retried_with_zero_hint() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::TOO_MANY_REQUESTS, json!({"message": "slow down"}))
            .with_header("retry-after", "0"),
        MockResponse::json(StatusCode::OK, json!({"ok": true})),
    ]);
    let client = FinwiseClient::with_options("key", server.options(1)).expect("valid client");

    let body = client.get("/accounts", None).expect("request must succeed after retry");

    assert_eq!(body, json!({"ok": true}));
    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].headers["request-id"], requests[1].headers["request-id"]);
}

#[test]
fn rate_limit_exhaustion_reports_header_hint() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::TOO_MANY_REQUESTS, json!({}))
            .with_header("retry-after", "9"),
        MockResponse::json(StatusCode::TOO_MANY_REQUESTS, json!({}))
            .with_header("retry-after", "4"),
    ]);
    let client = client_without_backoff(server.options(1));

    let err = client.get("/accounts", None).expect_err("request must fail");

    assert_eq!(err.kind(), Some(ErrorKind::RateLimit));
    assert_eq!(err.retry_after(), Some(4));
    assert_eq!(server.hits.load(Ordering::SeqCst), 2);
}

#[test]
fn server_errors_are_retried_then_classified() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::BAD_GATEWAY, json!({"message": "bad gateway"})),
        MockResponse::json(StatusCode::SERVICE_UNAVAILABLE, json!({"message": "unavailable"})),
        MockResponse::json(StatusCode::INTERNAL_SERVER_ERROR, json!({"message": "boom"})),
    ]);
    let client = client_without_backoff(server.options(2));

    let err = client.get("/accounts", None).expect_err("request must fail");

    assert_eq!(err.kind(), Some(ErrorKind::ServerError));
    assert_eq!(err.status_code(), Some(500));
    assert_eq!(err.api_error().map(|api| api.message.as_str()), Some("boom"));
    assert_eq!(server.hits.load(Ordering::SeqCst), 3);
}

#[test]
fn server_error_recovers_on_retry() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::INTERNAL_SERVER_ERROR, json!({"message": "boom"})),
        MockResponse::json(StatusCode::OK, sample_account()),
    ]);
    let client = client_without_backoff(server.options(1));

    let body = client.get("/accounts/acc_123abc", None).expect("request must succeed after retry");

    assert_eq!(body["id"], "acc_123abc");
    assert_eq!(server.hits.load(Ordering::SeqCst), 2);
}

#[test]
fn request_timeout_surfaces_timeout_error() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::OK, sample_account()).with_delay(Duration::from_millis(500)),
    ]);
    let client = FinwiseClient::with_options(
        "key",
        ClientOptions {
            timeout_ms: 50,
            ..server.options(0)
        },
    )
    .expect("valid client");

    let err = client.get("/accounts", None).expect_err("request must time out");

    assert_eq!(err.kind(), Some(ErrorKind::Timeout));
    assert!(err.request_id().is_some());
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn unreachable_server_surfaces_connection_error_after_retries() {
    let address = std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .expect("must reserve a local port");
    let client = client_without_backoff(ClientOptions {
        base_url: format!("http://{address}"),
        timeout_ms: 2_000,
        max_retries: 2,
    });

    let err = client.get("/accounts", None).expect_err("request must fail");

    assert_eq!(err.kind(), Some(ErrorKind::Connection));
    assert!(err.to_string().contains("failed to connect"));
}

#[test]
fn closed_client_rejects_calls() {
    let server = spawn_server(vec![MockResponse::json(StatusCode::OK, json!({}))]);
    let client = FinwiseClient::with_options("key", server.options(0)).expect("valid client");

    client.get("/accounts", None).expect("first call must succeed");
    client.close();
    client.close();

    assert!(client.is_closed());
    assert!(matches!(client.get("/accounts", None), Err(FinwiseError::Closed)));
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[test]
fn concurrent_calls_use_distinct_request_ids() {
    let server = spawn_server(
        (0..4)
            .map(|_| MockResponse::json(StatusCode::OK, json!({})))
            .collect(),
    );
    let client = FinwiseClient::with_options("key", server.options(0)).expect("valid client");

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let client = client.clone();
            std::thread::spawn(move || client.get("/accounts", None))
        })
        .collect();
    for handle in handles {
        handle
            .join()
            .expect("worker must not panic")
            .expect("call must succeed");
    }

    let mut ids: Vec<String> = server
        .requests()
        .iter()
        .map(|request| request.headers["request-id"].to_str().expect("ascii").to_owned())
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4);
}

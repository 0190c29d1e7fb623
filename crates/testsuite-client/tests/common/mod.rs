//! Mock service for integration tests.
//!
//! Serves every path, records each request and answers with scripted
//! replies (default: `200 {}`).

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use testsuite_client::{ClientConfig, MonitorClient, ServiceClient, ServiceClientBuilder};

pub const ACTION_PATH: &str = "/tests/{action}";
pub const MONITOR_PATH: &str = "/service/monitor";

/// One request as seen by the mock service.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub body: Value,
}

#[derive(Debug, Clone)]
struct Reply {
    status: u16,
    body: Value,
    delay: Option<Duration>,
}

#[derive(Default)]
struct MockState {
    requests: Mutex<Vec<RecordedRequest>>,
    once: Mutex<HashMap<String, VecDeque<Reply>>>,
    always: Mutex<HashMap<String, Reply>>,
}

/// In-process service under test.
pub struct MockService {
    pub addr: SocketAddr,
    state: Arc<MockState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockService {
    pub async fn start() -> Self {
        testsuite_logging::init_test();

        let state = Arc::new(MockState::default());
        let app = Router::new()
            .fallback(handle)
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get local addr");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("Server error");
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new()
            .with_testsuite_action_path(ACTION_PATH)
            .with_server_monitor_path(MONITOR_PATH)
    }

    pub fn client_builder(&self) -> ServiceClientBuilder {
        ServiceClient::builder(self.base_url(), self.config())
    }

    pub fn client(&self) -> ServiceClient {
        self.client_builder().build().expect("Failed to build client")
    }

    pub fn monitor_client(&self) -> MonitorClient {
        MonitorClient::new(self.base_url(), self.config()).expect("Failed to build monitor")
    }

    /// Answer the next request to `path` with `status` and `body`.
    pub fn respond_once(&self, path: &str, status: u16, body: Value) {
        self.state
            .once
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(Reply {
                status,
                body,
                delay: None,
            });
    }

    /// Answer the next request to `path` only after `delay`.
    pub fn respond_once_after(&self, path: &str, delay: Duration, status: u16, body: Value) {
        self.state
            .once
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(Reply {
                status,
                body,
                delay: Some(delay),
            });
    }

    /// Answer every request to `path` with `status` and `body`.
    pub fn respond(&self, path: &str, status: u16, body: Value) {
        self.state
            .always
            .lock()
            .unwrap()
            .insert(
                path.to_string(),
                Reply {
                    status,
                    body,
                    delay: None,
                },
            );
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    /// Bodies posted to the control action, in order.
    pub fn control_bodies(&self) -> Vec<Value> {
        self.requests_to("/tests/control")
            .into_iter()
            .map(|r| r.body)
            .collect()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }

    pub fn clear(&self) {
        self.state.requests.lock().unwrap().clear();
    }

    /// Wait until a request to `path` is recorded.
    pub async fn wait_for(&self, path: &str, timeout: Duration) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if !self.requests_to(path).is_empty() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

impl Drop for MockService {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn handle(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let body = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|_| json!(String::from_utf8_lossy(&body)))
    };
    let headers = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    state.requests.lock().unwrap().push(RecordedRequest {
        method: method.to_string(),
        path: path.clone(),
        query,
        headers,
        body,
    });

    let scripted = state
        .once
        .lock()
        .unwrap()
        .get_mut(&path)
        .and_then(VecDeque::pop_front);
    let reply = scripted
        .or_else(|| state.always.lock().unwrap().get(&path).cloned())
        .unwrap_or(Reply {
            status: 200,
            body: json!({}),
            delay: None,
        });

    if let Some(delay) = reply.delay {
        tokio::time::sleep(delay).await;
    }

    let status = StatusCode::from_u16(reply.status).expect("valid status");
    (status, Json(reply.body)).into_response()
}

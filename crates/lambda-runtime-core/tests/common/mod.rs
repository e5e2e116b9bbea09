//! Mock runtime API coordinator for integration tests.
//!
//! Replays queued responses in order and records every request it receives,
//! including the peer address so connection reuse can be observed.

#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::Response;
use axum::Router;
use std::collections::VecDeque;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// A response the coordinator will send.
#[derive(Debug, Clone)]
pub struct MockResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

impl MockResponse {
    /// A poll response carrying an invocation.
    pub fn event(id: impl ToString, body: &str) -> Self {
        Self::status(200)
            .with_header("lambda-runtime-aws-request-id", &id.to_string())
            .with_body(body)
    }

    /// An empty 202 accepting a report.
    pub fn accepted() -> Self {
        Self::status(202)
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }
}

/// A request the coordinator received.
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: String,
    pub peer: SocketAddr,
}

impl ReceivedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("request body is not JSON")
    }
}

#[derive(Default)]
struct MockState {
    queue: VecDeque<MockResponse>,
    received: Vec<ReceivedRequest>,
}

/// Coordinator listening on an ephemeral localhost port.
pub struct MockCoordinator {
    addr: SocketAddr,
    state: Arc<Mutex<MockState>>,
    server: JoinHandle<()>,
}

impl MockCoordinator {
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(MockState::default()));
        let app = Router::new()
            .fallback(record_and_reply)
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock coordinator");
        let addr = listener.local_addr().expect("Failed to read local address");

        let server = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("Mock coordinator error");
        });

        Self {
            addr,
            state,
            server,
        }
    }

    /// `host:port` to hand to the runtime.
    pub fn endpoint(&self) -> String {
        self.addr.to_string()
    }

    pub fn enqueue(&self, responses: impl IntoIterator<Item = MockResponse>) {
        self.state.lock().unwrap().queue.extend(responses);
    }

    pub fn received(&self) -> Vec<ReceivedRequest> {
        self.state.lock().unwrap().received.clone()
    }
}

impl Drop for MockCoordinator {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn record_and_reply(
    State(state): State<Arc<Mutex<MockState>>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut state = state.lock().unwrap();
    state.received.push(ReceivedRequest {
        method,
        path: uri.path().to_string(),
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
        peer,
    });

    let Some(reply) = state.queue.pop_front() else {
        return Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(Body::from("no queued response"))
            .unwrap();
    };

    let mut builder = Response::builder().status(reply.status);
    for (name, value) in &reply.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder.body(Body::from(reply.body)).unwrap()
}

/// Diagnostic sink shared between a runtime and the test inspecting it.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

//! Local Runtime API host
//!
//! Implements the host side of the Lambda Runtime API on an ephemeral
//! port: queues invocations, delivers them to a polling runtime, and
//! records everything the runtime reports back.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error};
use uuid::Uuid;

/// Errors from starting the local host
#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to bind local runtime API: {0}")]
    Bind(#[from] std::io::Error),
}

/// An invocation waiting to be delivered to the runtime.
///
/// Built with sensible defaults: a fresh request id, a trace id, no
/// deadline and no function ARN. Each can be overridden, and the trace id
/// can be suppressed entirely to provoke a protocol violation.
pub struct QueuedInvocation {
    pub request_id: String,
    pub trace_id: Option<String>,
    pub deadline_ms: Option<i64>,
    pub function_arn: Option<String>,
    pub payload: Bytes,
}

impl QueuedInvocation {
    /// Queue a JSON event.
    pub fn new(event: Value) -> Self {
        Self::raw(event.to_string())
    }

    /// Queue a raw payload, JSON or not.
    pub fn raw(payload: impl Into<Bytes>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            trace_id: Some(format!("Root=1-{}", Uuid::new_v4().simple())),
            deadline_ms: None,
            function_arn: None,
            payload: payload.into(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Deliver without the trace header. A conforming runtime treats this
    /// as a fatal protocol violation.
    pub fn without_trace_id(mut self) -> Self {
        self.trace_id = None;
        self
    }

    pub fn with_deadline_ms(mut self, deadline_ms: i64) -> Self {
        self.deadline_ms = Some(deadline_ms);
        self
    }

    /// Set the deadline relative to now.
    pub fn with_deadline_in(self, budget: Duration) -> Self {
        let deadline = chrono::Utc::now().timestamp_millis() + budget.as_millis() as i64;
        self.with_deadline_ms(deadline)
    }

    pub fn with_function_arn(mut self, arn: impl Into<String>) -> Self {
        self.function_arn = Some(arn.into());
        self
    }
}

/// Error body shape posted to the error endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireError {
    pub error_type: String,
    pub error_message: String,
    #[serde(default)]
    pub stack_trace: Option<Vec<String>>,
}

/// One recorded error report.
#[derive(Debug, Clone)]
pub struct RecordedError {
    /// Value of the error-type header, if the runtime sent one.
    pub error_type: Option<String>,
    /// Parsed body, if it was the expected JSON shape.
    pub envelope: Option<WireError>,
    /// Raw body as received.
    pub raw: String,
}

/// What the runtime reported for one invocation.
#[derive(Debug, Clone)]
pub enum Completion {
    Response { body: String },
    Error(RecordedError),
}

struct HostState {
    /// Channel feeding the blocking next-invocation endpoint
    queue_rx: RwLock<mpsc::Receiver<QueuedInvocation>>,
    completions: RwLock<HashMap<String, Completion>>,
    /// Request ids in the order their reports arrived
    order: RwLock<Vec<String>>,
    init_errors: RwLock<Vec<RecordedError>>,
}

impl HostState {
    async fn record(&self, request_id: String, completion: Completion) {
        self.order.write().await.push(request_id.clone());
        self.completions.write().await.insert(request_id, completion);
    }
}

/// A running local Runtime API host
pub struct LocalRuntimeApi {
    addr: SocketAddr,
    queue_tx: mpsc::Sender<QueuedInvocation>,
    state: Arc<HostState>,
    server: JoinHandle<()>,
}

impl LocalRuntimeApi {
    /// Start the host on an ephemeral local port.
    pub async fn start() -> Result<Self, HostError> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (queue_tx, queue_rx) = mpsc::channel(64);
        let state = Arc::new(HostState {
            queue_rx: RwLock::new(queue_rx),
            completions: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
            init_errors: RwLock::new(Vec::new()),
        });

        let router = host_router(state.clone());
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!(error = %e, "Local runtime API stopped");
            }
        });

        debug!(addr = %addr, "Local runtime API started");

        Ok(Self {
            addr,
            queue_tx,
            state,
            server,
        })
    }

    /// `host:port`, the form `AWS_LAMBDA_RUNTIME_API` carries.
    pub fn endpoint(&self) -> String {
        self.addr.to_string()
    }

    /// Full base URL of the host.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Queue an invocation for delivery and return its request id.
    pub async fn enqueue(&self, invocation: QueuedInvocation) -> String {
        let request_id = invocation.request_id.clone();
        self.queue_tx
            .send(invocation)
            .await
            .expect("local runtime API queue closed");
        request_id
    }

    /// Wait until the runtime reports a completion for the request id.
    pub async fn wait_for_completion(
        &self,
        request_id: &str,
        timeout: Duration,
    ) -> Option<Completion> {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if let Some(completion) = self.state.completions.read().await.get(request_id) {
                return Some(completion.clone());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }

    /// Completion found for the request id, if any arrived yet.
    pub async fn completion(&self, request_id: &str) -> Option<Completion> {
        self.state.completions.read().await.get(request_id).cloned()
    }

    /// Request ids in the order their reports arrived.
    pub async fn completion_order(&self) -> Vec<String> {
        self.state.order.read().await.clone()
    }

    /// Init errors reported so far.
    pub async fn init_errors(&self) -> Vec<RecordedError> {
        self.state.init_errors.read().await.clone()
    }
}

impl Drop for LocalRuntimeApi {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn host_router(state: Arc<HostState>) -> Router {
    Router::new()
        .route(
            "/2018-06-01/runtime/invocation/next",
            get(get_next_invocation),
        )
        .route(
            "/2018-06-01/runtime/invocation/:request_id/response",
            post(post_invocation_response),
        )
        .route(
            "/2018-06-01/runtime/invocation/:request_id/error",
            post(post_invocation_error),
        )
        .route("/2018-06-01/runtime/init/error", post(post_init_error))
        .with_state(state)
}

/// GET /runtime/invocation/next
///
/// Blocks until an invocation is queued, then delivers it.
async fn get_next_invocation(State(state): State<Arc<HostState>>) -> impl IntoResponse {
    debug!("Runtime requesting next invocation");

    let invocation = {
        let mut rx = state.queue_rx.write().await;
        match rx.recv().await {
            Some(inv) => inv,
            None => {
                return Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Body::from("Invocation queue closed"))
                    .unwrap();
            }
        }
    };

    debug!(request_id = %invocation.request_id, "Delivering invocation to runtime");

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header("Lambda-Runtime-Aws-Request-Id", &invocation.request_id);

    if let Some(trace_id) = &invocation.trace_id {
        builder = builder.header("Lambda-Runtime-Trace-Id", trace_id);
    }
    if let Some(deadline_ms) = invocation.deadline_ms {
        builder = builder.header("Lambda-Runtime-Deadline-Ms", deadline_ms.to_string());
    }
    if let Some(arn) = &invocation.function_arn {
        builder = builder.header("Lambda-Runtime-Invoked-Function-Arn", arn);
    }

    builder.body(Body::from(invocation.payload)).unwrap()
}

/// POST /runtime/invocation/{requestId}/response
async fn post_invocation_response(
    State(state): State<Arc<HostState>>,
    Path(request_id): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    debug!(request_id = %request_id, "Runtime sent response");

    let body = String::from_utf8_lossy(&body).to_string();
    state.record(request_id, Completion::Response { body }).await;

    StatusCode::ACCEPTED
}

/// POST /runtime/invocation/{requestId}/error
async fn post_invocation_error(
    State(state): State<Arc<HostState>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let recorded = recorded_error(&headers, &body);
    debug!(
        request_id = %request_id,
        error_type = recorded.error_type.as_deref().unwrap_or("<none>"),
        "Runtime sent invocation error"
    );

    state.record(request_id, Completion::Error(recorded)).await;

    StatusCode::ACCEPTED
}

/// POST /runtime/init/error
async fn post_init_error(
    State(state): State<Arc<HostState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let recorded = recorded_error(&headers, &body);
    debug!(
        error_type = recorded.error_type.as_deref().unwrap_or("<none>"),
        "Runtime sent init error"
    );

    state.init_errors.write().await.push(recorded);

    StatusCode::ACCEPTED
}

fn recorded_error(headers: &HeaderMap, body: &Bytes) -> RecordedError {
    let error_type = headers
        .get("Lambda-Runtime-Function-Error-Type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let raw = String::from_utf8_lossy(body).to_string();
    let envelope = serde_json::from_str(&raw).ok();

    RecordedError {
        error_type,
        envelope,
        raw,
    }
}

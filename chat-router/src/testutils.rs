//! In-process fakes for the router's collaborators.

use crate::backend::{
    BackendConnector, BackendError, Completion, CompletionBackend, SessionInfo,
};
use crate::config::{BackendMode, NodeConfig};
use crate::delivery::MessageDelivery;
use crate::nodes::NodeDescriptor;
use affinity_store::{AffinityStore, MemoryStore};
use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::AUTHORIZATION;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use url::Url;

pub fn node_config(api_base: &str, priority: Option<i64>) -> NodeConfig {
    NodeConfig {
        api_base: Url::parse(api_base).unwrap(),
        api_key: "key".to_string(),
        chat_id: "chat".to_string(),
        mode: BackendMode::Chat,
        priority,
        enabled: true,
    }
}

pub fn node_descriptor(api_base: &str, priority: i64) -> NodeDescriptor {
    NodeDescriptor {
        api_base: Url::parse(api_base).unwrap(),
        api_key: format!("key-{priority}"),
        chat_id: format!("chat-{priority}"),
        mode: BackendMode::Chat,
        priority,
    }
}

/// A request seen by a [`RecordingServer`].
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: Value,
}

type Responder = dyn Fn(&RecordedRequest) -> (StatusCode, Value) + Send + Sync;

/// HTTP server that records every request and answers with JSON computed
/// from it.
pub struct RecordingServer {
    port: u16,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl RecordingServer {
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&RecordedRequest) -> (StatusCode, Value) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to address");
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let responder: Arc<Responder> = Arc::new(responder);

        let server_requests = requests.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let io = TokioIo::new(stream);
                let requests = server_requests.clone();
                let responder = responder.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        record(requests.clone(), responder.clone(), req)
                    });
                    let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                        .serve_connection(io, service)
                        .await;
                });
            }
        });

        Self { port, requests }
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

async fn record(
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    responder: Arc<Responder>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(String::from);
    let authorization = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let body = req
        .into_body()
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .unwrap_or_default();
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    let recorded = RecordedRequest {
        path,
        query,
        authorization,
        body,
    };
    let (status, body) = responder(&recorded);
    requests.lock().push(recorded);

    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    Ok(response)
}

/// Scriptable backend node.
///
/// Session ids are unique per node; answers echo the question.
pub struct FakeBackend {
    api_base: String,
    fail_create: AtomicBool,
    completion_failures: AtomicUsize,
    create_calls: AtomicUsize,
    complete_calls: AtomicUsize,
    session_names: Mutex<Vec<String>>,
    completed_sessions: Mutex<Vec<String>>,
}

impl FakeBackend {
    fn new(api_base: &str) -> Self {
        Self {
            api_base: api_base.to_string(),
            fail_create: AtomicBool::new(false),
            completion_failures: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            complete_calls: AtomicUsize::new(0),
            session_names: Mutex::new(Vec::new()),
            completed_sessions: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Makes the next `count` completions fail.
    pub fn fail_next_completions(&self, count: usize) {
        self.completion_failures.store(count, Ordering::SeqCst);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    pub fn session_names(&self) -> Vec<String> {
        self.session_names.lock().clone()
    }

    pub fn completed_sessions(&self) -> Vec<String> {
        self.completed_sessions.lock().clone()
    }
}

#[async_trait]
impl CompletionBackend for FakeBackend {
    async fn create_session(&self, name: &str) -> Result<SessionInfo, BackendError> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(BackendError::Api {
                code: 100,
                message: format!("{} refused to create a session", self.api_base),
            });
        }
        self.session_names.lock().push(name.to_string());
        Ok(SessionInfo {
            id: format!("{}session-{n}", self.api_base),
            name: Some(name.to_string()),
        })
    }

    async fn complete(&self, session_id: &str, question: &str) -> Result<Completion, BackendError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .completion_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BackendError::Api {
                code: 102,
                message: "session is gone".to_string(),
            });
        }
        self.completed_sessions.lock().push(session_id.to_string());
        Ok(Completion {
            answer: format!("answer to {question}"),
            session_id: Some(session_id.to_string()),
        })
    }
}

/// Hands out one [`FakeBackend`] per node address. Clones share backends.
#[derive(Clone, Default)]
pub struct FakeConnector {
    backends: Arc<Mutex<HashMap<String, Arc<FakeBackend>>>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The backend behind `api_base`, in its normalized URL form.
    pub fn backend(&self, api_base: &str) -> Arc<FakeBackend> {
        self.backends
            .lock()
            .entry(api_base.to_string())
            .or_insert_with(|| Arc::new(FakeBackend::new(api_base)))
            .clone()
    }
}

impl BackendConnector for FakeConnector {
    fn connect(&self, node: &NodeDescriptor) -> Arc<dyn CompletionBackend> {
        self.backend(node.api_base.as_str())
    }
}

/// Memory store that counts deletes and can refuse writes.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    deletes: AtomicUsize,
    fail_puts: AtomicBool,
    fail_deletes: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl AffinityStore for RecordingStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str) -> bool {
        if self.fail_puts.load(Ordering::SeqCst) {
            return false;
        }
        self.inner.put(key, value).await
    }

    async fn delete(&self, key: &str) -> bool {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return false;
        }
        self.inner.delete(key).await
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SentReply {
    pub bot_id: String,
    pub to: String,
    pub msg_id: String,
    pub text: String,
}

#[derive(Default)]
pub struct RecordingDelivery {
    replies: Mutex<Vec<SentReply>>,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replies(&self) -> Vec<SentReply> {
        self.replies.lock().clone()
    }

    /// Waits until at least `count` replies were sent, or two seconds passed.
    pub async fn wait_for_replies(&self, count: usize) -> Vec<SentReply> {
        for _ in 0..200 {
            if self.replies.lock().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.replies()
    }
}

#[async_trait]
impl MessageDelivery for RecordingDelivery {
    async fn send_reply(&self, bot_id: &str, to: &str, msg_id: &str, text: &str) {
        self.replies.lock().push(SentReply {
            bot_id: bot_id.to_string(),
            to: to.to_string(),
            msg_id: msg_id.to_string(),
            text: text.to_string(),
        });
    }
}

//! An in-process stand-in for the etcd JSON gateway.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::AUTHORIZATION;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;

struct FakeEtcdState {
    require_auth: bool,
    auth_delay: Duration,
    token: Mutex<String>,
    // base64 key -> base64 value, as the gateway sees them
    kv: Mutex<HashMap<String, String>>,
    auth_requests: AtomicUsize,
    fail_data_ops: AtomicBool,
}

pub struct FakeEtcd {
    port: u16,
    state: Arc<FakeEtcdState>,
}

impl FakeEtcd {
    pub async fn start(require_auth: bool, auth_delay: Duration) -> Self {
        let state = Arc::new(FakeEtcdState {
            require_auth,
            auth_delay,
            token: Mutex::new("first-token".to_string()),
            kv: Mutex::new(HashMap::new()),
            auth_requests: AtomicUsize::new(0),
            fail_data_ops: AtomicBool::new(false),
        });

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to address");
        let port = listener.local_addr().unwrap().port();

        let server_state = state.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let io = TokioIo::new(stream);
                let state = server_state.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req| handle(state.clone(), req));
                    let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                        .serve_connection(io, service)
                        .await;
                });
            }
        });

        FakeEtcd { port, state }
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.state
            .kv
            .lock()
            .insert(STANDARD.encode(key), STANDARD.encode(value));
    }

    pub fn auth_requests(&self) -> usize {
        self.state.auth_requests.load(Ordering::SeqCst)
    }

    pub fn rotate_token(&self, token: &str) {
        *self.state.token.lock() = token.to_string();
    }

    pub fn fail_data_ops(&self, fail: bool) {
        self.state.fail_data_ops.store(fail, Ordering::SeqCst);
    }
}

fn respond(status: StatusCode, body: Value) -> Result<Response<Full<Bytes>>, Infallible> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    Ok(response)
}

async fn handle(
    state: Arc<FakeEtcdState>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_string();
    let auth = req
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

    if path == "/v3/auth/authenticate" {
        state.auth_requests.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(state.auth_delay).await;
        if body["name"] != "root" || body["password"] != "secret" {
            return respond(
                StatusCode::UNAUTHORIZED,
                json!({"error": "authentication failed, invalid user ID or password"}),
            );
        }
        let token = state.token.lock().clone();
        return respond(StatusCode::OK, json!({"header": {}, "token": token}));
    }

    if state.require_auth && auth.as_deref() != Some(state.token.lock().as_str()) {
        return respond(
            StatusCode::UNAUTHORIZED,
            json!({"error": "etcdserver: invalid auth token"}),
        );
    }

    if state.fail_data_ops.load(Ordering::SeqCst) {
        return respond(StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "boom"}));
    }

    let key = body["key"].as_str().unwrap_or_default().to_string();
    match path.as_str() {
        "/v3/kv/range" => match state.kv.lock().get(&key) {
            Some(value) => respond(
                StatusCode::OK,
                json!({"header": {}, "kvs": [{"key": key, "value": value}], "count": "1"}),
            ),
            None => respond(StatusCode::OK, json!({"header": {}})),
        },
        "/v3/kv/put" => {
            let value = body["value"].as_str().unwrap_or_default().to_string();
            state.kv.lock().insert(key, value);
            respond(StatusCode::OK, json!({"header": {}}))
        }
        "/v3/kv/deleterange" => {
            let deleted = state.kv.lock().remove(&key).is_some() as u8;
            respond(StatusCode::OK, json!({"header": {}, "deleted": deleted.to_string()}))
        }
        _ => respond(StatusCode::NOT_FOUND, json!({"error": "not found"})),
    }
}

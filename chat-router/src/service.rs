use crate::chat_handler::ChatService;
use crate::errors::ChatRouterError;
use crate::event::{WebhookEvent, parse_event};
use crate::metrics_defs::WEBHOOK_EVENTS;
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use hyper::body::{Body, Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use serde_json::Value;
use shared::counter;
use shared::http::make_json_response;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type ServiceResponse = Response<BoxBody<Bytes, ChatRouterError>>;

/// The webhook the chat front-end posts its events to.
///
/// - `GET {base}/` answers a liveness greeting
/// - `POST {base}/v1/receive` accepts one event
///
/// Messages are answered on a task of their own; the webhook acknowledges
/// as soon as the event is parsed.
#[derive(Clone)]
pub struct ChatRouterService {
    base_path: Arc<str>,
    chat: Arc<ChatService>,
}

impl ChatRouterService {
    pub fn new(base_path: &str, chat: Arc<ChatService>) -> Self {
        Self {
            base_path: Arc::from(base_path.trim_end_matches('/')),
            chat,
        }
    }

    pub async fn handle_request<B>(&self, req: Request<B>) -> ServiceResponse
    where
        B: Body,
        B::Error: Display,
    {
        let (parts, body) = req.into_parts();
        let Some(route) = parts.uri.path().strip_prefix(&*self.base_path) else {
            return not_found();
        };

        match (&parts.method, route) {
            (&Method::GET, "" | "/") => {
                make_json_response(StatusCode::OK, "success", "Hello, World!")
            }
            (&Method::POST, "/v1/receive") => self.receive(body).await,
            _ => not_found(),
        }
    }

    async fn receive<B>(&self, body: B) -> ServiceResponse
    where
        B: Body,
        B::Error: Display,
    {
        let payload = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read webhook body");
                return make_json_response(StatusCode::BAD_REQUEST, "unreadable body", Value::Null);
            }
        };

        match parse_event(&payload) {
            Ok(WebhookEvent::Message(message)) => {
                counter!(WEBHOOK_EVENTS, "kind" => "message").increment(1);
                tracing::debug!(
                    bot_id = %message.bot_id,
                    from = %message.from,
                    msg_id = %message.msg_id,
                    "Received message"
                );
                let chat = self.chat.clone();
                tokio::spawn(async move {
                    chat.handle_message(message).await;
                });
            }
            Ok(WebhookEvent::Ignored { event }) => {
                counter!(WEBHOOK_EVENTS, "kind" => "ignored").increment(1);
                tracing::info!(event = event, "Ignoring unhandled event");
            }
            Err(e) => {
                counter!(WEBHOOK_EVENTS, "kind" => "invalid").increment(1);
                tracing::warn!(error = %e, "Malformed webhook event");
                return make_json_response(StatusCode::BAD_REQUEST, "invalid event", Value::Null);
            }
        }

        make_json_response(StatusCode::OK, "event received", Value::Null)
    }
}

fn not_found() -> ServiceResponse {
    make_json_response(StatusCode::NOT_FOUND, "not found", Value::Null)
}

impl Service<Request<Incoming>> for ChatRouterService {
    type Response = ServiceResponse;
    type Error = ChatRouterError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.handle_request(req).await) })
    }
}

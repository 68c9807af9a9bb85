use crate::backend::protocol::{
    ApiResponse, Completion, CompletionRequest, CreateSessionRequest, SessionInfo,
};
use crate::backend::{BackendConnector, BackendError, CompletionBackend};
use crate::config::BackendMode;
use crate::nodes::NodeDescriptor;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// HTTP client for one backend node, authenticated with that node's API key.
pub struct BackendClient {
    http: reqwest::Client,
    node: NodeDescriptor,
}

impl BackendClient {
    pub fn new(http: reqwest::Client, node: NodeDescriptor) -> Self {
        Self { http, node }
    }

    fn endpoint(&self, action: &str) -> Result<String, BackendError> {
        if self.node.chat_id.is_empty() {
            return Err(BackendError::MissingChatId(self.node.api_base.to_string()));
        }

        let family = match self.node.mode {
            BackendMode::Chat => "chats",
            BackendMode::Agent => "agents",
        };

        Ok(format!(
            "{}/{}/{}/{}",
            self.node.api_base.as_str().trim_end_matches('/'),
            family,
            self.node.chat_id,
            action
        ))
    }

    async fn request<B, T>(&self, url: String, body: &B) -> Result<T, BackendError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.node.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Http { status, body });
        }

        let envelope: ApiResponse = response.json().await?;
        if envelope.code != 0 {
            return Err(BackendError::Api {
                code: envelope.code,
                message: envelope.message.unwrap_or_default(),
            });
        }

        serde_json::from_value(envelope.data).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[async_trait]
impl CompletionBackend for BackendClient {
    async fn create_session(&self, name: &str) -> Result<SessionInfo, BackendError> {
        let url = self.endpoint("sessions")?;
        // Agent sessions take the agent's begin-node inputs, not a name.
        let name = match self.node.mode {
            BackendMode::Chat => Some(name),
            BackendMode::Agent => None,
        };
        self.request(url, &CreateSessionRequest { name }).await
    }

    async fn complete(&self, session_id: &str, question: &str) -> Result<Completion, BackendError> {
        let url = self.endpoint("completions")?;
        self.request(
            url,
            &CompletionRequest {
                question,
                session_id,
                stream: false,
            },
        )
        .await
    }
}

/// Connects nodes over HTTP, sharing one connection pool.
#[derive(Clone, Default)]
pub struct HttpBackendConnector {
    http: reqwest::Client,
}

impl HttpBackendConnector {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl BackendConnector for HttpBackendConnector {
    fn connect(&self, node: &NodeDescriptor) -> Arc<dyn CompletionBackend> {
        Arc::new(BackendClient::new(self.http.clone(), node.clone()))
    }
}

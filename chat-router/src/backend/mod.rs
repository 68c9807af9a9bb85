//! Completion backend: a per-node client for the answer-generation API.
//!
//! A client talks to exactly one node and never retries. Failover across
//! nodes belongs to the [`Executor`](crate::executor::Executor).

pub mod client;
pub mod protocol;

use crate::nodes::NodeDescriptor;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;

pub use client::{BackendClient, HttpBackendConnector};
pub use protocol::{Completion, SessionInfo};

#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned HTTP {status}: {body}")]
    Http { status: StatusCode, body: String },

    #[error("backend error (code {code}): {message}")]
    Api { code: i64, message: String },

    #[error("could not decode backend response: {0}")]
    Decode(String),

    #[error("node {0} has no chat id configured")]
    MissingChatId(String),
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Opens a new conversation on the node.
    async fn create_session(&self, name: &str) -> Result<SessionInfo, BackendError>;

    /// Asks `question` within an existing session.
    async fn complete(&self, session_id: &str, question: &str) -> Result<Completion, BackendError>;
}

/// Builds the client bound to a node's address and credentials.
pub trait BackendConnector: Send + Sync {
    fn connect(&self, node: &NodeDescriptor) -> Arc<dyn CompletionBackend>;
}

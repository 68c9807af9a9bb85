//! Session affinity: keeps every conversation on the backend node and
//! backend session that hold its context.
//!
//! A conversation is either unbound (no pinning in the store) or bound to a
//! [`PinnedSession`]. Bound turns go straight to the pinned node without
//! failover. The first failed completion deletes the pinning and fails the
//! turn; the next turn finds the conversation unbound and creates a new
//! session through the [`Executor`], starting again from the highest
//! priority node.
//!
//! Two turns of the same conversation racing through creation each write
//! their own pinning and the last write wins. This is accepted: end users
//! are expected to talk one turn at a time.

use crate::backend::{BackendConnector, BackendError};
use crate::conversation::ConversationKey;
use crate::executor::Executor;
use crate::metrics_defs::{SESSIONS_CREATED, SESSIONS_INVALIDATED};
use crate::nodes::{NodeDescriptor, NodeRegistry};
use affinity_store::AffinityStore;
use serde::{Deserialize, Serialize};
use shared::counter;
use std::collections::HashMap;
use std::sync::Arc;

/// The backend session holding a conversation's context, and its node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinnedSession {
    pub session_id: String,
    pub node: NodeDescriptor,
}

#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    #[error("no backend session could be found or created")]
    NoSession,

    #[error("completion failed on the pinned node: {0}")]
    Completion(#[source] BackendError),
}

pub struct SessionAffinity {
    store: Arc<dyn AffinityStore>,
    connector: Arc<dyn BackendConnector>,
    executors: HashMap<String, Executor>,
    key_prefix: String,
}

impl SessionAffinity {
    pub fn new(
        store: Arc<dyn AffinityStore>,
        connector: Arc<dyn BackendConnector>,
        bots: HashMap<String, NodeRegistry>,
        key_prefix: impl Into<String>,
    ) -> Self {
        let executors = bots
            .into_iter()
            .map(|(bot_id, registry)| (bot_id, Executor::new(registry)))
            .collect();

        Self {
            store,
            connector,
            executors,
            key_prefix: key_prefix.into(),
        }
    }

    /// Returns the conversation's pinning, creating one if it has none.
    ///
    /// `None` means the bot has no usable node or every node refused to
    /// create a session.
    pub async fn resolve_or_create(&self, key: &ConversationKey) -> Option<PinnedSession> {
        let store_key = key.store_key(&self.key_prefix);

        if let Some(raw) = self.store.get(&store_key).await {
            match serde_json::from_str::<PinnedSession>(&raw) {
                Ok(pinned) => return Some(pinned),
                // Overwritten by the session created below.
                Err(e) => tracing::warn!(
                    key = %store_key,
                    error = %e,
                    "Discarding unreadable pinning"
                ),
            }
        }

        let executor = match self.executors.get(key.bot_id()) {
            Some(executor) if !executor.registry().is_empty() => executor,
            _ => {
                tracing::warn!(bot_id = %key.bot_id(), "No backend nodes configured for bot");
                return None;
            }
        };

        let name = key.session_name();
        let name = name.as_str();
        let executed = match executor
            .execute(|node| async move { node.client().create_session(name).await })
            .await
        {
            Ok(executed) => executed,
            Err(e) => {
                tracing::error!(
                    bot_id = %key.bot_id(),
                    key = %store_key,
                    error = %e,
                    "Could not create a backend session"
                );
                return None;
            }
        };

        let pinned = PinnedSession {
            session_id: executed.result.id,
            node: executed.node,
        };
        counter!(SESSIONS_CREATED).increment(1);
        tracing::info!(
            key = %store_key,
            session_id = %pinned.session_id,
            node = %pinned.node.api_base,
            "Pinned conversation to backend session"
        );

        match serde_json::to_string(&pinned) {
            Ok(value) => {
                if !self.store.put(&store_key, &value).await {
                    // The session still serves this turn; the next one creates another.
                    tracing::warn!(key = %store_key, "Could not persist pinning");
                }
            }
            Err(e) => tracing::error!(key = %store_key, error = %e, "Could not encode pinning"),
        }

        Some(pinned)
    }

    /// Answers `question` within the conversation's pinned session.
    ///
    /// A failed completion unpins the conversation and is not retried
    /// elsewhere within the same turn.
    pub async fn dispatch(
        &self,
        key: &ConversationKey,
        question: &str,
    ) -> Result<String, DispatchError> {
        let pinned = self
            .resolve_or_create(key)
            .await
            .ok_or(DispatchError::NoSession)?;

        let client = self.connector.connect(&pinned.node);
        match client.complete(&pinned.session_id, question).await {
            Ok(completion) => Ok(completion.answer),
            Err(e) => {
                tracing::warn!(
                    bot_id = %key.bot_id(),
                    session_id = %pinned.session_id,
                    node = %pinned.node.api_base,
                    error = %e,
                    "Completion failed on pinned node"
                );
                self.invalidate(key).await;
                Err(DispatchError::Completion(e))
            }
        }
    }

    async fn invalidate(&self, key: &ConversationKey) {
        let store_key = key.store_key(&self.key_prefix);
        counter!(SESSIONS_INVALIDATED).increment(1);
        if !self.store.delete(&store_key).await {
            tracing::error!(key = %store_key, "Could not delete stale pinning");
        }
    }
}

//! Backend Node Registry
//!
//! Built once per bot from configuration and immutable afterwards:
//!
//! 1. Disabled nodes are dropped
//! 2. The rest are ordered by ascending priority (nodes without one get
//!    [`DEFAULT_PRIORITY`]); ties keep their configured order
//! 3. Each node is paired with a client bound to its own address and key
//!
//! An empty registry is legal. Every execution against it fails with
//! "no nodes available".

use crate::backend::{BackendConnector, CompletionBackend};
use crate::config::{BackendMode, NodeConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

pub const DEFAULT_PRIORITY: i64 = 99;

/// Address and credentials of one backend node.
///
/// Copied by value into every pinning made against the node, so later
/// configuration changes never alter existing pinnings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDescriptor {
    pub api_base: Url,
    pub api_key: String,
    pub chat_id: String,
    #[serde(default)]
    pub mode: BackendMode,
    pub priority: i64,
}

impl From<NodeConfig> for NodeDescriptor {
    fn from(config: NodeConfig) -> Self {
        Self {
            api_base: config.api_base,
            api_key: config.api_key,
            chat_id: config.chat_id,
            mode: config.mode,
            priority: config.priority.unwrap_or(DEFAULT_PRIORITY),
        }
    }
}

/// A registry entry: the node and the client that talks to it.
#[derive(Clone)]
pub struct Node {
    descriptor: NodeDescriptor,
    client: Arc<dyn CompletionBackend>,
}

impl Node {
    pub fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    pub fn client(&self) -> &dyn CompletionBackend {
        self.client.as_ref()
    }
}

#[derive(Clone)]
pub struct NodeRegistry {
    nodes: Arc<Vec<Node>>,
}

impl NodeRegistry {
    pub fn new(configs: Vec<NodeConfig>, connector: &dyn BackendConnector) -> Self {
        let mut descriptors: Vec<NodeDescriptor> = configs
            .into_iter()
            .filter(|config| config.enabled)
            .map(NodeDescriptor::from)
            .collect();
        descriptors.sort_by_key(|descriptor| descriptor.priority);

        let nodes: Vec<Node> = descriptors
            .into_iter()
            .map(|descriptor| Node {
                client: connector.connect(&descriptor),
                descriptor,
            })
            .collect();

        for (index, node) in nodes.iter().enumerate() {
            tracing::debug!(
                index = index + 1,
                priority = node.descriptor.priority,
                api_base = %node.descriptor.api_base,
                chat_id = %node.descriptor.chat_id,
                "Registered backend node"
            );
        }

        Self {
            nodes: Arc::new(nodes),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in the order they are tried
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }
}

use affinity_store::StoreConfig;
use affinity_store::config::StoreConfigError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Base path must start with '/': {0}")]
    InvalidBasePath(String),

    #[error("Delivery api_base must be http or https: {0}")]
    InvalidDeliveryUrl(String),

    #[error("Node {index} of bot {bot} has an empty api_key")]
    EmptyApiKey { bot: String, index: usize },

    #[error("Node {index} of bot {bot} has an empty chat_id")]
    EmptyChatId { bot: String, index: usize },

    #[error("Store configuration error: {0}")]
    Store(#[from] StoreConfigError),
}

/// Chat router configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Webhook listener
    pub listener: Listener,
    /// Admin listener for health and readiness probes
    pub admin_listener: Listener,
    /// Prefix of every webhook route
    #[serde(default = "default_base_path")]
    pub base_path: String,
    /// Reply sent to direct conversations when a turn fails
    #[serde(default = "default_fail_msg")]
    pub fail_msg: String,
    /// Outbound message API of the chat front-end
    pub delivery: DeliveryConfig,
    /// Where conversation pinnings are persisted
    pub store: StoreConfig,
    /// Prefix of every pinning key in the store
    #[serde(default = "default_session_key_prefix")]
    pub session_key_prefix: String,
    /// Store key holding a JSON document of additional bot configurations
    #[serde(default)]
    pub bots_key: Option<String>,
    /// Bot id to bot configuration
    #[serde(default)]
    pub bots: IndexMap<String, BotConfig>,
}

fn default_base_path() -> String {
    "/api".to_string()
}

fn default_fail_msg() -> String {
    "Sorry, I can't answer right now. Please try again later.".to_string()
}

fn default_session_key_prefix() -> String {
    "sessions".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Validates the chat router configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if !self.base_path.starts_with('/') {
            return Err(ValidationError::InvalidBasePath(self.base_path.clone()));
        }

        if !matches!(self.delivery.api_base.scheme(), "http" | "https") {
            return Err(ValidationError::InvalidDeliveryUrl(
                self.delivery.api_base.to_string(),
            ));
        }

        self.store.validate()?;

        for (bot_id, bot) in &self.bots {
            bot.validate(bot_id)?;
        }

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct DeliveryConfig {
    pub api_base: Url,
}

/// Per-bot configuration.
///
/// Field aliases accept the camelCase document kept in the store. Unknown
/// fields are rejected so a misplaced section fails instead of loading an
/// empty bot.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BotConfig {
    #[serde(default, alias = "whiteList")]
    pub white_list: WhiteList,
    /// Whether the bot only answers group messages that mention it
    #[serde(default = "default_true", alias = "requireMention")]
    pub require_mention: bool,
    /// Backend nodes, in any order
    #[serde(default, alias = "ragflowNodes")]
    pub nodes: Vec<NodeConfig>,
}

impl BotConfig {
    pub fn validate(&self, bot_id: &str) -> Result<(), ValidationError> {
        for (index, node) in self.nodes.iter().enumerate() {
            if node.api_key.is_empty() {
                return Err(ValidationError::EmptyApiKey {
                    bot: bot_id.to_string(),
                    index,
                });
            }
            if node.chat_id.is_empty() {
                return Err(ValidationError::EmptyChatId {
                    bot: bot_id.to_string(),
                    index,
                });
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct WhiteList {
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub persons: Vec<String>,
}

/// Which family of completion endpoints a node serves
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    #[default]
    Chat,
    Agent,
}

/// A single backend node
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct NodeConfig {
    /// Base URL of the backend API (e.g. "http://ragflow-1/api/v1")
    #[serde(alias = "apiBase")]
    pub api_base: Url,
    #[serde(alias = "apiKey")]
    pub api_key: String,
    /// Chat assistant id, or agent id in agent mode
    #[serde(alias = "chatId")]
    pub chat_id: String,
    #[serde(default)]
    pub mode: BackendMode,
    /// Lower is tried first; nodes without one sort last
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Application document kept in the store by the bot deployment.
///
/// Only the `wechatBot` section is read; the other sections belong to other
/// services sharing the document.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoreDocument {
    pub wechat_bot: StoreBotSection,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoreBotSection {
    /// Replaces `delivery.api_base`
    #[serde(default)]
    pub api_base: Option<Url>,
    /// Replaces `fail_msg`
    #[serde(default)]
    pub fail_msg: Option<String>,
    pub bots: IndexMap<String, BotConfig>,
}

/// Parses the JSON application document kept in the store.
pub fn parse_store_document(json: &str) -> Result<StoreDocument, serde_json::Error> {
    serde_json::from_str(json)
}

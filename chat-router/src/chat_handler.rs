use crate::affinity::SessionAffinity;
use crate::backend::BackendConnector;
use crate::config::BotConfig;
use crate::delivery::MessageDelivery;
use crate::event::{InboundMessage, MessageKind};
use crate::metrics_defs::{TURN_DURATION, TURNS};
use crate::nodes::NodeRegistry;
use affinity_store::AffinityStore;
use indexmap::IndexMap;
use shared::{counter, histogram};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// What happened to an inbound message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Answered,
    Failed,
    UnknownBot,
    Unsupported,
    NotWhitelisted,
    NotMentioned,
    EmptyQuestion,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Answered => "answered",
            Outcome::Failed => "failed",
            Outcome::UnknownBot => "unknown_bot",
            Outcome::Unsupported => "unsupported",
            Outcome::NotWhitelisted => "not_whitelisted",
            Outcome::NotMentioned => "not_mentioned",
            Outcome::EmptyQuestion => "empty_question",
        }
    }
}

struct BotProfile {
    persons: HashSet<String>,
    groups: HashSet<String>,
    require_mention: bool,
}

/// Filters inbound messages per bot and answers the ones that pass.
pub struct ChatService {
    bots: HashMap<String, BotProfile>,
    affinity: SessionAffinity,
    delivery: Arc<dyn MessageDelivery>,
    fail_msg: String,
}

impl ChatService {
    pub fn from_config(
        bots: &IndexMap<String, BotConfig>,
        store: Arc<dyn AffinityStore>,
        connector: Arc<dyn BackendConnector>,
        delivery: Arc<dyn MessageDelivery>,
        key_prefix: &str,
        fail_msg: &str,
    ) -> Self {
        let mut profiles = HashMap::new();
        let mut registries = HashMap::new();

        for (bot_id, bot) in bots {
            let registry = NodeRegistry::new(bot.nodes.clone(), connector.as_ref());
            tracing::info!(
                bot_id = %bot_id,
                nodes = registry.len(),
                persons = bot.white_list.persons.len(),
                groups = bot.white_list.groups.len(),
                "Loaded bot"
            );
            registries.insert(bot_id.clone(), registry);
            profiles.insert(
                bot_id.clone(),
                BotProfile {
                    persons: bot.white_list.persons.iter().cloned().collect(),
                    groups: bot.white_list.groups.iter().cloned().collect(),
                    require_mention: bot.require_mention,
                },
            );
        }

        Self {
            bots: profiles,
            affinity: SessionAffinity::new(store, connector, registries, key_prefix),
            delivery,
            fail_msg: fail_msg.to_string(),
        }
    }

    pub async fn handle_message(&self, message: InboundMessage) -> Outcome {
        let outcome = self.route(&message).await;
        counter!(TURNS, "outcome" => outcome.as_str()).increment(1);
        outcome
    }

    async fn route(&self, message: &InboundMessage) -> Outcome {
        let Some(profile) = self.bots.get(&message.bot_id) else {
            tracing::warn!(bot_id = %message.bot_id, "Message for unknown bot");
            return Outcome::UnknownBot;
        };

        let Some(key) = message.conversation_key() else {
            tracing::debug!(
                bot_id = %message.bot_id,
                kind = ?message.kind,
                "Ignoring message kind"
            );
            return Outcome::Unsupported;
        };

        let allowed = match message.kind {
            MessageKind::Private => profile.persons.contains(&message.from),
            _ => profile.groups.contains(&message.from),
        };
        if !allowed {
            tracing::warn!(
                bot_id = %message.bot_id,
                from = %message.from,
                "Message from outside the white list"
            );
            return Outcome::NotWhitelisted;
        }

        if key.is_group() && profile.require_mention && !message.mentions_bot() {
            return Outcome::NotMentioned;
        }

        let question = strip_mentions(&message.text);
        if question.is_empty() {
            return Outcome::EmptyQuestion;
        }

        let start = Instant::now();
        match self.affinity.dispatch(&key, question).await {
            Ok(answer) => {
                histogram!(TURN_DURATION).record(start.elapsed().as_secs_f64());
                self.delivery
                    .send_reply(&message.bot_id, &message.from, &message.msg_id, &answer)
                    .await;
                Outcome::Answered
            }
            Err(e) => {
                tracing::warn!(
                    bot_id = %message.bot_id,
                    from = %message.from,
                    error = %e,
                    "Turn failed"
                );
                // Error text is never posted to groups.
                if !key.is_group() {
                    self.delivery
                        .send_reply(
                            &message.bot_id,
                            &message.from,
                            &message.msg_id,
                            &self.fail_msg,
                        )
                        .await;
                }
                Outcome::Failed
            }
        }
    }
}

/// Removes the leading `@name` mentions a client puts in front of a group
/// message. A mention ends at a four-per-em space or a plain space.
pub fn strip_mentions(text: &str) -> &str {
    let mut rest = text.trim_start();
    while let Some(mention) = rest.strip_prefix('@') {
        match mention.find(['\u{2005}', ' ']) {
            Some(end) => rest = mention[end..].trim_start(),
            None => return "",
        }
    }
    rest.trim_end()
}

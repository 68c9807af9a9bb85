//! Events pushed by the chat front-end to the webhook.
//!
//! Every event carries a numeric `event` code and the receiving bot's id.
//! Only received text messages (codes 10008 and 10009 with
//! `data.type == "recvMsg"`) are routed; everything else, including
//! heartbeats without a `data` object, is acknowledged and ignored.

use crate::conversation::ConversationKey;
use serde::Deserialize;
use serde_json::Value;

pub const EVENT_GROUP_MESSAGE: i64 = 10008;
pub const EVENT_PRIVATE_MESSAGE: i64 = 10009;

const RECV_MSG: &str = "recvMsg";

#[derive(Debug, Deserialize)]
struct RawEvent {
    event: i64,
    #[serde(default)]
    wxid: String,
    #[serde(default)]
    data: Option<RawEventData>,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    #[serde(rename = "type", default)]
    kind: Value,
    #[serde(default)]
    data: Option<RawMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(default)]
    from_type: i64,
    #[serde(default)]
    from_wxid: String,
    #[serde(default)]
    final_from_wxid: String,
    #[serde(default)]
    at_wxid_list: Vec<String>,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    msg_id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Private,
    Group,
    /// Official accounts and anything newer
    Other(i64),
}

impl From<i64> for MessageKind {
    fn from(from_type: i64) -> Self {
        match from_type {
            1 => MessageKind::Private,
            2 => MessageKind::Group,
            other => MessageKind::Other(other),
        }
    }
}

/// A text message received by one of the bots.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundMessage {
    pub bot_id: String,
    pub kind: MessageKind,
    /// The peer in a private chat, the group otherwise. Replies go here.
    pub from: String,
    /// Who actually wrote the message
    pub speaker: String,
    /// Ids the message mentions, groups only
    pub mentions: Vec<String>,
    pub text: String,
    pub msg_id: String,
}

impl InboundMessage {
    /// The conversation this message belongs to, if it is routable.
    pub fn conversation_key(&self) -> Option<ConversationKey> {
        match self.kind {
            MessageKind::Private => Some(ConversationKey::direct(&self.bot_id, &self.from)),
            MessageKind::Group => Some(ConversationKey::group(
                &self.bot_id,
                &self.from,
                &self.speaker,
            )),
            MessageKind::Other(_) => None,
        }
    }

    pub fn mentions_bot(&self) -> bool {
        self.mentions.iter().any(|id| *id == self.bot_id)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum WebhookEvent {
    Message(InboundMessage),
    Ignored { event: i64 },
}

/// Parses a webhook payload. Fails only on malformed JSON or a missing
/// event code.
pub fn parse_event(payload: &[u8]) -> Result<WebhookEvent, serde_json::Error> {
    let raw: RawEvent = serde_json::from_slice(payload)?;

    if raw.event != EVENT_GROUP_MESSAGE && raw.event != EVENT_PRIVATE_MESSAGE {
        return Ok(WebhookEvent::Ignored { event: raw.event });
    }

    let message = match raw.data {
        Some(RawEventData {
            kind,
            data: Some(message),
        }) if kind == RECV_MSG => message,
        _ => return Ok(WebhookEvent::Ignored { event: raw.event }),
    };

    Ok(WebhookEvent::Message(InboundMessage {
        bot_id: raw.wxid,
        kind: MessageKind::from(message.from_type),
        from: message.from_wxid,
        speaker: message.final_from_wxid,
        mentions: message.at_wxid_list,
        text: message.msg,
        msg_id: message.msg_id,
    }))
}

use url::form_urlencoded::byte_serialize;

/// Identity of one conversation as seen by one bot.
///
/// In a group every speaker has a conversation of their own, so two
/// members of the same group never share backend context.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConversationKey {
    Direct {
        bot_id: String,
        peer_id: String,
    },
    Group {
        bot_id: String,
        group_id: String,
        speaker_id: String,
    },
}

impl ConversationKey {
    pub fn direct(bot_id: impl Into<String>, peer_id: impl Into<String>) -> Self {
        Self::Direct {
            bot_id: bot_id.into(),
            peer_id: peer_id.into(),
        }
    }

    pub fn group(
        bot_id: impl Into<String>,
        group_id: impl Into<String>,
        speaker_id: impl Into<String>,
    ) -> Self {
        Self::Group {
            bot_id: bot_id.into(),
            group_id: group_id.into(),
            speaker_id: speaker_id.into(),
        }
    }

    pub fn bot_id(&self) -> &str {
        match self {
            Self::Direct { bot_id, .. } | Self::Group { bot_id, .. } => bot_id,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group { .. })
    }

    /// Key of this conversation's pinning in the affinity store.
    ///
    /// Every segment is percent-encoded, so a `/` inside an identity can
    /// never be mistaken for a separator.
    pub fn store_key(&self, prefix: &str) -> String {
        match self {
            Self::Direct { bot_id, peer_id } => {
                format!("{prefix}/{}/private/{}", encode(bot_id), encode(peer_id))
            }
            Self::Group {
                bot_id,
                group_id,
                speaker_id,
            } => format!(
                "{prefix}/{}/group/{}/{}",
                encode(bot_id),
                encode(group_id),
                encode(speaker_id)
            ),
        }
    }

    /// Name given to the backend session, for tracing it in backend logs.
    pub fn session_name(&self) -> String {
        match self {
            Self::Direct { bot_id, peer_id } => format!("{bot_id}_{peer_id}"),
            Self::Group {
                bot_id,
                group_id,
                speaker_id,
            } => format!("{bot_id}_{group_id}_{speaker_id}"),
        }
    }
}

fn encode(segment: &str) -> String {
    byte_serialize(segment.as_bytes()).collect()
}

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

/// Sends replies back through the chat front-end.
///
/// Delivery is fire-and-forget for callers: failures are logged here and
/// never reported back.
#[async_trait]
pub trait MessageDelivery: Send + Sync {
    /// Replies to `to`, quoting the message `msg_id`.
    async fn send_reply(&self, bot_id: &str, to: &str, msg_id: &str, text: &str);
}

#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error("delivery request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("delivery API returned HTTP {status}: {body}")]
    Http {
        status: reqwest::StatusCode,
        body: String,
    },
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    data: QuotedText<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuotedText<'a> {
    msg_id: &'a str,
    wxid: &'a str,
    msg: &'a str,
}

/// HTTP client for the front-end's message API.
pub struct BotApiClient {
    http: reqwest::Client,
    api_base: Url,
}

impl BotApiClient {
    pub fn new(http: reqwest::Client, api_base: Url) -> Self {
        Self { http, api_base }
    }

    pub async fn try_send_reply(
        &self,
        bot_id: &str,
        to: &str,
        msg_id: &str,
        text: &str,
    ) -> Result<(), DeliveryError> {
        let mut url = self.api_base.clone();
        url.query_pairs_mut().append_pair("wxid", bot_id);

        let response = self
            .http
            .post(url)
            .json(&SendRequest {
                kind: "sendReferText",
                data: QuotedText {
                    msg_id,
                    wxid: to,
                    msg: text,
                },
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Http { status, body });
        }
        Ok(())
    }
}

#[async_trait]
impl MessageDelivery for BotApiClient {
    async fn send_reply(&self, bot_id: &str, to: &str, msg_id: &str, text: &str) {
        match self.try_send_reply(bot_id, to, msg_id, text).await {
            Ok(()) => tracing::debug!(bot_id = %bot_id, to = %to, "Reply delivered"),
            Err(e) => tracing::error!(
                bot_id = %bot_id,
                to = %to,
                msg_id = %msg_id,
                error = %e,
                "Failed to deliver reply"
            ),
        }
    }
}

//! Wire types of the completion backend API.
//!
//! Every response is wrapped in `{code, message, data}`; `code == 0` means
//! success, anything else is an application error described by `message`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ApiResponse {
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct CompletionRequest<'a> {
    pub question: &'a str,
    pub session_id: &'a str,
    pub stream: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SessionInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Completion {
    pub answer: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

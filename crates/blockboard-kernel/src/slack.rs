//! Slack Web API client.
//!
//! Two methods are used: `conversations.history` to read a message's blocks
//! and `chat.update` to replace them. Slack answers most failures with HTTP
//! 200 and `{"ok": false, "error": "..."}`, so every response body is checked.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use blockboard_types::{Document, MessageRef};

use crate::projection::{ChatClient, ChatError};

pub const DEFAULT_API_BASE_URL: &str = "https://slack.com/api";

const HISTORY: &str = "conversations.history";
const UPDATE: &str = "chat.update";

/// Bot-token client for the Slack Web API.
#[derive(Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct History {
    #[serde(default)]
    messages: Vec<HistoryMessage>,
}

#[derive(Debug, Deserialize)]
struct HistoryMessage {
    #[serde(default)]
    blocks: Option<Value>,
}

impl SlackClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, DEFAULT_API_BASE_URL)
    }

    /// Point at a different API root (tests, enterprise proxies).
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    /// Check HTTP status and Slack's `ok` flag, returning the body.
    async fn checked(method: &'static str, response: reqwest::Response) -> Result<Value, ChatError> {
        let body: Value = response.error_for_status()?.json().await?;
        let envelope: Envelope =
            serde_json::from_value(body.clone()).map_err(|e| ChatError::MalformedResponse {
                method,
                detail: e.to_string(),
            })?;
        if !envelope.ok {
            return Err(ChatError::Api {
                method,
                error: envelope.error.unwrap_or_else(|| "unknown_error".to_string()),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl ChatClient for SlackClient {
    async fn read_message(&self, message: &MessageRef) -> Result<Document, ChatError> {
        debug!(message = %message, "reading message");
        let response = self
            .http
            .get(self.url(HISTORY))
            .bearer_auth(&self.token)
            .query(&[
                ("channel", message.channel.as_str()),
                ("latest", message.ts.as_str()),
                ("limit", "1"),
                ("inclusive", "true"),
            ])
            .send()
            .await?;

        let body = Self::checked(HISTORY, response).await?;
        let history: History =
            serde_json::from_value(body).map_err(|e| ChatError::MalformedResponse {
                method: HISTORY,
                detail: e.to_string(),
            })?;

        let first = history
            .messages
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::MessageNotFound(message.clone()))?;
        match first.blocks {
            Some(blocks) => Ok(Document::from_value(blocks)?),
            None => Ok(Document::default()),
        }
    }

    async fn replace_message_blocks(
        &self,
        message: &MessageRef,
        document: &Document,
    ) -> Result<(), ChatError> {
        let payload = json!({
            "channel": message.channel,
            "ts": message.ts,
            "blocks": document.to_value()?,
        });
        let response = self
            .http
            .post(self.url(UPDATE))
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?;
        Self::checked(UPDATE, response).await?;
        debug!(message = %message, "message updated");
        Ok(())
    }
}

impl std::fmt::Debug for SlackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackClient")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use signoff_core::domain::{ChannelId, MessageRef};

use crate::blocks::MessageTemplate;

pub const DEFAULT_BASE_URL: &str = "https://slack.com/api";

#[derive(Debug, Error)]
pub enum ChatApiError {
    #[error("transport failure calling {method}: {source}")]
    Http {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} returned error: {error}")]
    Slack { method: &'static str, error: String },
}

/// The handful of Web API methods the workflow needs. Trait-shaped so the
/// notification executor and workflow tests can run against a recording
/// fake.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// `chat.postMessage`; returns the address of the delivered message.
    async fn post_message(
        &self,
        channel: &ChannelId,
        message: &MessageTemplate,
    ) -> Result<MessageRef, ChatApiError>;

    /// `chat.update` against a previously delivered message.
    async fn update_message(
        &self,
        message_ref: &MessageRef,
        message: &MessageTemplate,
    ) -> Result<(), ChatApiError>;

    /// `views.open` with a prebuilt view payload.
    async fn open_view(&self, trigger_id: &str, view: &Value) -> Result<(), ChatApiError>;

    /// `conversations.join`; idempotent on channels the bot already joined.
    async fn join_channel(&self, channel: &ChannelId) -> Result<(), ChatApiError>;
}

pub struct HttpChatApi {
    client: reqwest::Client,
    bot_token: SecretString,
    base_url: String,
}

#[derive(Deserialize)]
struct ApiEnvelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    channel: Option<String>,
}

impl HttpChatApi {
    pub fn new(bot_token: SecretString) -> Self {
        Self::with_base_url(bot_token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(bot_token: SecretString, base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client, bot_token, base_url: base_url.into() }
    }

    async fn call(
        &self,
        method: &'static str,
        body: Value,
    ) -> Result<ApiEnvelope, ChatApiError> {
        let url = format!("{}/{method}", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.bot_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|source| ChatApiError::Http { method, source })?;

        let envelope: ApiEnvelope = response
            .json()
            .await
            .map_err(|source| ChatApiError::Http { method, source })?;

        if !envelope.ok {
            return Err(ChatApiError::Slack {
                method,
                error: envelope.error.unwrap_or_else(|| "unknown_error".to_string()),
            });
        }
        Ok(envelope)
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn post_message(
        &self,
        channel: &ChannelId,
        message: &MessageTemplate,
    ) -> Result<MessageRef, ChatApiError> {
        let envelope = self
            .call(
                "chat.postMessage",
                json!({
                    "channel": channel.0,
                    "text": message.fallback_text,
                    "blocks": message.blocks,
                }),
            )
            .await?;

        let channel =
            envelope.channel.map(ChannelId).unwrap_or_else(|| channel.clone());
        let ts = envelope.ts.ok_or(ChatApiError::Slack {
            method: "chat.postMessage",
            error: "response missing ts".to_string(),
        })?;
        Ok(MessageRef { channel, ts })
    }

    async fn update_message(
        &self,
        message_ref: &MessageRef,
        message: &MessageTemplate,
    ) -> Result<(), ChatApiError> {
        self.call(
            "chat.update",
            json!({
                "channel": message_ref.channel.0,
                "ts": message_ref.ts,
                "text": message.fallback_text,
                "blocks": message.blocks,
            }),
        )
        .await?;
        Ok(())
    }

    async fn open_view(&self, trigger_id: &str, view: &Value) -> Result<(), ChatApiError> {
        self.call("views.open", json!({ "trigger_id": trigger_id, "view": view }))
            .await?;
        Ok(())
    }

    async fn join_channel(&self, channel: &ChannelId) -> Result<(), ChatApiError> {
        match self.call("conversations.join", json!({ "channel": channel.0 })).await {
            Ok(_) => Ok(()),
            // Already being a member is success for our purposes.
            Err(ChatApiError::Slack { error, .. }) if error == "method_not_supported_for_channel_type" || error == "already_in_channel" => {
                Ok(())
            }
            Err(other) => Err(other),
        }
    }
}

/// In-memory fake that records every call and can be scripted to fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    PostMessage { channel: ChannelId, message: MessageTemplate },
    UpdateMessage { message_ref: MessageRef, message: MessageTemplate },
    OpenView { trigger_id: String },
    JoinChannel { channel: ChannelId },
}

#[derive(Default)]
pub struct RecordingChatApi {
    calls: Mutex<Vec<RecordedCall>>,
    failures: Mutex<VecDeque<String>>,
    next_ts: Mutex<u64>,
}

impl RecordingChatApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a Slack-style error; the next call consumes it and fails.
    pub fn script_failure(&self, error: impl Into<String>) {
        self.failures.lock().unwrap().push_back(error.into());
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, method: &'static str, call: RecordedCall) -> Result<(), ChatApiError> {
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(ChatApiError::Slack { method, error });
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

#[async_trait]
impl ChatApi for RecordingChatApi {
    async fn post_message(
        &self,
        channel: &ChannelId,
        message: &MessageTemplate,
    ) -> Result<MessageRef, ChatApiError> {
        self.record(
            "chat.postMessage",
            RecordedCall::PostMessage { channel: channel.clone(), message: message.clone() },
        )?;
        let mut next_ts = self.next_ts.lock().unwrap();
        *next_ts += 1;
        Ok(MessageRef { channel: channel.clone(), ts: format!("{next_ts}.000100", next_ts = *next_ts) })
    }

    async fn update_message(
        &self,
        message_ref: &MessageRef,
        message: &MessageTemplate,
    ) -> Result<(), ChatApiError> {
        self.record(
            "chat.update",
            RecordedCall::UpdateMessage {
                message_ref: message_ref.clone(),
                message: message.clone(),
            },
        )
    }

    async fn open_view(&self, trigger_id: &str, _view: &Value) -> Result<(), ChatApiError> {
        self.record("views.open", RecordedCall::OpenView { trigger_id: trigger_id.to_string() })
    }

    async fn join_channel(&self, channel: &ChannelId) -> Result<(), ChatApiError> {
        self.record("conversations.join", RecordedCall::JoinChannel { channel: channel.clone() })
    }
}

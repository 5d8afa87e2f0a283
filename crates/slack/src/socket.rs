use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::events::{
    default_dispatcher, EventContext, EventDispatcher, HandlerResult, SlackEnvelope, SlackEvent,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Socket Mode connection seam. The acknowledgement payload carries the
/// ephemeral slash-command replies and modal validation errors, so acks
/// happen after dispatch.
#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError>;
    async fn acknowledge(
        &self,
        envelope_id: &str,
        payload: Option<Value>,
    ) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[derive(Default)]
pub struct NoopSocketTransport;

#[async_trait]
impl SocketTransport for NoopSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        Ok(None)
    }

    async fn acknowledge(
        &self,
        _envelope_id: &str,
        _payload: Option<Value>,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: EventDispatcher,
    reconnect_policy: ReconnectPolicy,
}

impl Default for SocketModeRunner {
    fn default() -> Self {
        Self {
            transport: Arc::new(NoopSocketTransport),
            dispatcher: default_dispatcher(),
            reconnect_policy: ReconnectPolicy::default(),
        }
    }
}

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, reconnect_policy }
    }

    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "socket mode transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "socket mode retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "opening socket mode transport connection");
        self.transport.connect().await?;
        info!(attempt, "socket mode transport connected");

        loop {
            let Some(envelope) = self.transport.next_envelope().await? else {
                info!(attempt, "socket mode transport stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };
            let request_id = correlation_request_id(&envelope);

            info!(
                event_name = "ingress.slack.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                request_id = request_id.as_deref().unwrap_or("unknown"),
                "received slack envelope"
            );

            let context = EventContext { correlation_id: envelope.envelope_id.clone() };
            let payload = match self.dispatcher.dispatch(&envelope, &context).await {
                Ok(result) => ack_payload(&result),
                Err(error) => {
                    warn!(
                        envelope_id = %envelope.envelope_id,
                        correlation_id = %envelope.envelope_id,
                        request_id = request_id.as_deref().unwrap_or("unknown"),
                        error = %error,
                        "event dispatch failed; acknowledging without a reply"
                    );
                    None
                }
            };

            if let Err(error) =
                self.transport.acknowledge(&envelope.envelope_id, payload).await
            {
                warn!(
                    event_name = "ingress.slack.ack_failed",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    request_id = request_id.as_deref().unwrap_or("unknown"),
                    error = %error,
                    "failed to acknowledge slack envelope"
                );
            } else {
                debug!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    request_id = request_id.as_deref().unwrap_or("unknown"),
                    "acknowledged slack envelope"
                );
            }
        }
    }
}

fn ack_payload(result: &HandlerResult) -> Option<Value> {
    match result {
        HandlerResult::Responded(message) => Some(json!({
            "response_type": "ephemeral",
            "text": message.fallback_text,
            "blocks": message.blocks,
        })),
        HandlerResult::ViewErrors(errors) => Some(json!({
            "response_action": "errors",
            "errors": errors,
        })),
        HandlerResult::Processed | HandlerResult::Ignored => None,
    }
}

fn correlation_request_id(envelope: &SlackEnvelope) -> Option<String> {
    match &envelope.event {
        SlackEvent::SlashCommand(payload) => request_id_from_text(&payload.text),
        SlackEvent::BlockAction(event) => event.value.as_deref().and_then(|value| {
            value
                .strip_prefix("approve_")
                .or_else(|| value.strip_prefix("reject_"))
                .filter(|token| token.starts_with("req-"))
                .map(str::to_owned)
        }),
        SlackEvent::ViewSubmission(_) | SlackEvent::Unsupported { .. } => None,
    }
}

fn request_id_from_text(text: &str) -> Option<String> {
    text.split_whitespace()
        .map(|token| token.trim_matches(|ch: char| !ch.is_ascii_alphanumeric() && ch != '-'))
        .find(|token| {
            token.strip_prefix("req-").is_some_and(|suffix| {
                !suffix.is_empty() && suffix.chars().all(|ch| ch.is_ascii_alphanumeric())
            })
        })
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::Value;
    use tokio::sync::Mutex;

    use crate::commands::SlashCommandPayload;
    use crate::events::{
        BlockActionEvent, EventDispatcher, NoopWorkflowService, SlackEnvelope, SlackEvent,
        SlashCommandHandler,
    };

    use super::{ReconnectPolicy, SocketModeRunner, SocketTransport, TransportError};

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        envelopes: VecDeque<Result<Option<SlackEnvelope>, TransportError>>,
        disconnect_results: VecDeque<Result<(), TransportError>>,
        connect_attempts: usize,
        acknowledgements: Vec<(String, Option<Value>)>,
        disconnect_calls: usize,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            envelopes: Vec<Result<Option<SlackEnvelope>, TransportError>>,
            disconnect_results: Vec<Result<(), TransportError>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    envelopes: envelopes.into(),
                    disconnect_results: disconnect_results.into(),
                    connect_attempts: 0,
                    acknowledgements: Vec::new(),
                    disconnect_calls: 0,
                }),
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn acknowledgements(&self) -> Vec<(String, Option<Value>)> {
            self.state.lock().await.acknowledgements.clone()
        }
    }

    #[async_trait]
    impl SocketTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
            let mut state = self.state.lock().await;
            state.envelopes.pop_front().unwrap_or(Ok(None))
        }

        async fn acknowledge(
            &self,
            envelope_id: &str,
            payload: Option<Value>,
        ) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.acknowledgements.push((envelope_id.to_owned(), payload));
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.disconnect_calls += 1;
            state.disconnect_results.pop_front().unwrap_or(Ok(()))
        }
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![
                Ok(Some(SlackEnvelope {
                    envelope_id: "env-1".to_owned(),
                    event: SlackEvent::Unsupported { event_type: "test".to_owned() },
                })),
                Ok(None),
            ],
            vec![Ok(())],
        ));

        let runner = SocketModeRunner::new(
            transport.clone(),
            EventDispatcher::default(),
            ReconnectPolicy { max_retries: 2, base_delay_ms: 0, max_delay_ms: 0 },
        );

        runner.start().await.expect("runner should not fail");

        assert_eq!(transport.connect_attempts().await, 2);
        let acks = transport.acknowledgements().await;
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].0, "env-1");
        assert!(acks[0].1.is_none());
    }

    #[tokio::test]
    async fn exhausts_retries_without_crashing() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![
                Err(TransportError::Connect("fail-1".to_owned())),
                Err(TransportError::Connect("fail-2".to_owned())),
                Err(TransportError::Connect("fail-3".to_owned())),
            ],
            vec![],
            vec![],
        ));

        let runner = SocketModeRunner::new(
            transport.clone(),
            EventDispatcher::default(),
            ReconnectPolicy { max_retries: 2, base_delay_ms: 0, max_delay_ms: 0 },
        );

        runner.start().await.expect("runner should degrade gracefully");
        assert_eq!(transport.connect_attempts().await, 3);
    }

    #[tokio::test]
    async fn handler_replies_ride_the_acknowledgement() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![
                Ok(Some(SlackEnvelope {
                    envelope_id: "env-help".to_owned(),
                    event: SlackEvent::SlashCommand(SlashCommandPayload {
                        command: "/signoff".to_owned(),
                        text: "help".to_owned(),
                        user_id: "U-1".to_owned(),
                        team_id: "T-1".to_owned(),
                        channel_id: "C-1".to_owned(),
                        trigger_id: "trigger-1".to_owned(),
                    }),
                })),
                Ok(None),
            ],
            vec![Ok(())],
        ));

        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(SlashCommandHandler::new(NoopWorkflowService));
        let runner = SocketModeRunner::new(
            transport.clone(),
            dispatcher,
            ReconnectPolicy { max_retries: 0, base_delay_ms: 0, max_delay_ms: 0 },
        );

        runner.start().await.expect("runner completes");

        let acks = transport.acknowledgements().await;
        assert_eq!(acks[0].0, "env-help");
        let payload = acks[0].1.as_ref().expect("ack carries the reply");
        assert_eq!(payload["response_type"], "ephemeral");
        assert!(payload["text"].as_str().unwrap_or_default().contains("help"));
    }

    #[test]
    fn extracts_request_correlation_from_actions_and_text() {
        let action = SlackEnvelope {
            envelope_id: "env-2".to_owned(),
            event: SlackEvent::BlockAction(BlockActionEvent {
                user_id: "U-1".to_owned(),
                team_id: "T-1".to_owned(),
                channel_id: "D-1".to_owned(),
                message_ts: "1.0".to_owned(),
                action_id: "approve_action".to_owned(),
                value: Some("approve_req-0a1b2c".to_owned()),
            }),
        };
        assert_eq!(super::correlation_request_id(&action).as_deref(), Some("req-0a1b2c"));

        let slash = SlackEnvelope {
            envelope_id: "env-3".to_owned(),
            event: SlackEvent::SlashCommand(SlashCommandPayload {
                command: "/signoff".to_owned(),
                text: "status req-0a1b2c".to_owned(),
                user_id: "U-1".to_owned(),
                team_id: "T-1".to_owned(),
                channel_id: "C-1".to_owned(),
                trigger_id: String::new(),
            }),
        };
        assert_eq!(super::correlation_request_id(&slash).as_deref(), Some("req-0a1b2c"));
        assert_eq!(super::request_id_from_text("status nothing here"), None);
    }
}

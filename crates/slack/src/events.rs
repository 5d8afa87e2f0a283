use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use signoff_core::domain::{
    ChannelId, Decision, MessageRef, RequestDraft, RequestId, TeamId, UserId,
};
use signoff_core::errors::WorkflowError;

use crate::api::ChatApiError;
use crate::blocks::{self, MessageTemplate, APPROVE_ACTION_ID, REJECT_ACTION_ID};
use crate::commands::{
    classify, normalize, CommandError, SignoffCommand, SlashCommandPayload,
};
use crate::views::{self, ValidationErrors, REQUEST_MODAL_CALLBACK_ID};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    SlashCommand(SlashCommandPayload),
    BlockAction(BlockActionEvent),
    ViewSubmission(ViewSubmissionEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::SlashCommand(_) => SlackEventType::SlashCommand,
            Self::BlockAction(_) => SlackEventType::BlockAction,
            Self::ViewSubmission(_) => SlackEventType::ViewSubmission,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    SlashCommand,
    BlockAction,
    ViewSubmission,
    Unsupported,
}

/// One button press on a decision card.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockActionEvent {
    pub user_id: String,
    pub team_id: String,
    pub channel_id: String,
    pub message_ts: String,
    pub action_id: String,
    pub value: Option<String>,
}

impl BlockActionEvent {
    /// The message the pressed button lives on.
    pub fn container_ref(&self) -> MessageRef {
        MessageRef { channel: ChannelId(self.channel_id.clone()), ts: self.message_ts.clone() }
    }
}

/// A submitted modal, state payload still unparsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewSubmissionEvent {
    pub user_id: String,
    pub team_id: String,
    pub callback_id: String,
    pub state: Value,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

/// What a handler owes the transport after processing an event.
///
/// `Responded` rides back on the envelope acknowledgement as an ephemeral
/// reply; `ViewErrors` becomes the modal's `response_action: errors`
/// payload. `Processed` means all effects already went out through the
/// workflow's own notification path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(MessageTemplate),
    Processed,
    Ignored,
    ViewErrors(ValidationErrors),
}

/// Failures crossing the service seam, folded so handlers have one place
/// to turn them into words for the acting human.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Api(#[from] ChatApiError),
}

impl ServiceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Workflow(error) => error.user_message(),
            Self::Api(_) => "Slack did not accept that request. Please try again.",
        }
    }
}

#[derive(Debug, Error)]
pub enum EventHandlerError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// The three operations interface handlers need from the workflow. The
/// real implementation lives with the workflow wiring; the Noop keeps the
/// dispatcher constructible in isolation.
#[async_trait]
pub trait WorkflowService: Send + Sync {
    async fn open_request_modal(
        &self,
        trigger_id: &str,
        ctx: &EventContext,
    ) -> Result<(), ServiceError>;

    async fn submit(
        &self,
        draft: RequestDraft,
        ctx: &EventContext,
    ) -> Result<RequestId, ServiceError>;

    /// Applies one decision and runs the resulting fan-out. `container` is
    /// the card the button press arrived on.
    async fn decide(
        &self,
        request_id: &RequestId,
        actor: &UserId,
        decision: Decision,
        container: Option<MessageRef>,
        ctx: &EventContext,
    ) -> Result<(), ServiceError>;

    async fn status(&self, request_id: &RequestId) -> Result<MessageTemplate, ServiceError>;
}

#[async_trait]
pub trait DestinationAdmin: Send + Sync {
    async fn set_logging_destination(
        &self,
        team: TeamId,
        channel: ChannelId,
        ctx: &EventContext,
    ) -> Result<(), ServiceError>;
}

#[derive(Default, Clone, Copy)]
pub struct NoopWorkflowService;

#[async_trait]
impl WorkflowService for NoopWorkflowService {
    async fn open_request_modal(
        &self,
        _trigger_id: &str,
        _ctx: &EventContext,
    ) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn submit(
        &self,
        _draft: RequestDraft,
        _ctx: &EventContext,
    ) -> Result<RequestId, ServiceError> {
        Ok(RequestId("req-0".to_owned()))
    }

    async fn decide(
        &self,
        _request_id: &RequestId,
        _actor: &UserId,
        _decision: Decision,
        _container: Option<MessageRef>,
        _ctx: &EventContext,
    ) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn status(&self, _request_id: &RequestId) -> Result<MessageTemplate, ServiceError> {
        Ok(blocks::no_longer_active_notice())
    }
}

#[async_trait]
impl DestinationAdmin for NoopWorkflowService {
    async fn set_logging_destination(
        &self,
        _team: TeamId,
        _channel: ChannelId,
        _ctx: &EventContext,
    ) -> Result<(), ServiceError> {
        Ok(())
    }
}

pub fn default_dispatcher() -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(SlashCommandHandler::new(NoopWorkflowService));
    dispatcher.register(BlockActionHandler::new(NoopWorkflowService));
    dispatcher.register(ViewSubmissionHandler::new(NoopWorkflowService));
    dispatcher
}

pub struct SlashCommandHandler<S> {
    service: Arc<S>,
}

impl<S> SlashCommandHandler<S>
where
    S: WorkflowService + DestinationAdmin,
{
    pub fn new(service: S) -> Self {
        Self { service: Arc::new(service) }
    }

    pub fn with_shared(service: Arc<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for SlashCommandHandler<S>
where
    S: WorkflowService + DestinationAdmin + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::SlashCommand
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::SlashCommand(payload) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let command = normalize(payload.clone())?;
        match classify(&command.text) {
            SignoffCommand::New => {
                match self.service.open_request_modal(&command.trigger_id, ctx).await {
                    Ok(()) => Ok(HandlerResult::Processed),
                    Err(error) => Ok(HandlerResult::Responded(blocks::error_message(
                        error.user_message(),
                        &ctx.correlation_id,
                    ))),
                }
            }
            SignoffCommand::Status { request_id } => {
                match self.service.status(&request_id).await {
                    Ok(message) => Ok(HandlerResult::Responded(message)),
                    Err(error) => Ok(HandlerResult::Responded(blocks::error_message(
                        error.user_message(),
                        &ctx.correlation_id,
                    ))),
                }
            }
            SignoffCommand::LogChannel { channel } => {
                match self
                    .service
                    .set_logging_destination(command.team_id, channel.clone(), ctx)
                    .await
                {
                    Ok(()) => Ok(HandlerResult::Responded(
                        crate::blocks::MessageBuilder::new(format!(
                            "Logging destination set to <#{channel}>"
                        ))
                        .section("signoff.logchannel.confirmation.v1", |section| {
                            section.mrkdwn(format!(
                                "✅ Approval activity for this workspace will be logged to <#{channel}>."
                            ));
                        })
                        .build(),
                    )),
                    Err(error) => Ok(HandlerResult::Responded(blocks::error_message(
                        error.user_message(),
                        &ctx.correlation_id,
                    ))),
                }
            }
            SignoffCommand::Help => Ok(HandlerResult::Responded(blocks::help_message())),
            SignoffCommand::Unknown { verb } => {
                let mut message = blocks::help_message();
                message.fallback_text = format!("Unknown `/signoff` subcommand: {verb}");
                Ok(HandlerResult::Responded(message))
            }
        }
    }
}

/// Splits a decision button value (`approve_req-...` / `reject_req-...`)
/// into its decision and request id.
pub fn parse_decision_value(action_id: &str, value: &str) -> Option<(Decision, RequestId)> {
    let (decision, token) = match action_id {
        APPROVE_ACTION_ID => (Decision::Approve, value.strip_prefix("approve_")?),
        REJECT_ACTION_ID => (Decision::Reject, value.strip_prefix("reject_")?),
        _ => return None,
    };
    if token.is_empty() {
        return None;
    }
    Some((decision, RequestId(token.to_owned())))
}

pub struct BlockActionHandler<S> {
    service: Arc<S>,
}

impl<S> BlockActionHandler<S>
where
    S: WorkflowService,
{
    pub fn new(service: S) -> Self {
        Self { service: Arc::new(service) }
    }

    pub fn with_shared(service: Arc<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for BlockActionHandler<S>
where
    S: WorkflowService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::BlockAction
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::BlockAction(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let Some((decision, request_id)) = event
            .value
            .as_deref()
            .and_then(|value| parse_decision_value(&event.action_id, value))
        else {
            return Ok(HandlerResult::Ignored);
        };

        let actor = UserId(event.user_id.clone());
        match self
            .service
            .decide(&request_id, &actor, decision, Some(event.container_ref()), ctx)
            .await
        {
            Ok(()) => Ok(HandlerResult::Processed),
            Err(error) => Ok(HandlerResult::Responded(blocks::error_message(
                error.user_message(),
                &ctx.correlation_id,
            ))),
        }
    }
}

pub struct ViewSubmissionHandler<S> {
    service: Arc<S>,
}

impl<S> ViewSubmissionHandler<S>
where
    S: WorkflowService,
{
    pub fn new(service: S) -> Self {
        Self { service: Arc::new(service) }
    }

    pub fn with_shared(service: Arc<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for ViewSubmissionHandler<S>
where
    S: WorkflowService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::ViewSubmission
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::ViewSubmission(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        if event.callback_id != REQUEST_MODAL_CALLBACK_ID {
            return Ok(HandlerResult::Ignored);
        }

        let draft = match views::parse_submission(
            &event.state,
            UserId(event.user_id.clone()),
            TeamId(event.team_id.clone()),
        ) {
            Ok(draft) => draft,
            Err(errors) => return Ok(HandlerResult::ViewErrors(errors)),
        };

        match self.service.submit(draft, ctx).await {
            Ok(_) => Ok(HandlerResult::Processed),
            Err(error) => {
                // Pin the failure on the details field so the modal shows it.
                let mut errors = ValidationErrors::new();
                errors.insert(
                    views::DETAILS_BLOCK_ID.to_owned(),
                    error.user_message().to_owned(),
                );
                Ok(HandlerResult::ViewErrors(errors))
            }
        }
    }
}

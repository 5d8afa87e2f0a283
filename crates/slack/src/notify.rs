use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use signoff_core::destinations::DestinationStore;
use signoff_core::domain::{ApprovalRequest, ChannelId, MessageRef, UserId};
use signoff_core::fanout::{
    plan, ApproverNote, FanoutTrigger, Notification, RequesterNote,
};
use signoff_core::store::RequestStore;

use crate::api::{ChatApi, ChatApiError};
use crate::blocks::{self, Names};
use crate::directory::Directory;

/// One send in a fan-out plan failed. Never escalated: the executor logs it
/// and moves on to the next entry.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Api(#[from] ChatApiError),
    #[error("no card address recorded for approver {0}")]
    MissingCardRef(UserId),
}

/// Delivers the notifications a fan-out plan owes after a state transition.
///
/// Each delivery is isolated: one failed send is logged and skipped, the
/// rest of the plan still goes out. Card addresses returned by the chat
/// surface are written back into the store so later transitions can edit
/// the cards in place.
#[derive(Clone)]
pub struct NotificationExecutor {
    api: Arc<dyn ChatApi>,
    directory: Arc<dyn Directory>,
    store: Arc<RequestStore>,
    destinations: Option<Arc<DestinationStore>>,
}

impl NotificationExecutor {
    pub fn new(
        api: Arc<dyn ChatApi>,
        directory: Arc<dyn Directory>,
        store: Arc<RequestStore>,
        destinations: Option<Arc<DestinationStore>>,
    ) -> Self {
        Self { api, directory, store, destinations }
    }

    async fn resolve_names(&self, request: &ApprovalRequest) -> Names {
        let mut names = Names::new();
        let mut users: Vec<&UserId> = vec![&request.requester_id];
        users.extend(request.approver_ids.iter());
        users.extend(request.rejections.iter());
        for user in users {
            if !names.contains_key(user) {
                let name = self.directory.display_name(user).await;
                names.insert(user.clone(), name);
            }
        }
        names
    }

    fn trigger_actor<'a>(trigger: &'a FanoutTrigger) -> Option<&'a UserId> {
        match trigger {
            FanoutTrigger::Created => None,
            FanoutTrigger::PartialApproval { actor }
            | FanoutTrigger::FullApproval { actor }
            | FanoutTrigger::Rejected { actor }
            | FanoutTrigger::NoOpAlreadyFinal { actor } => Some(actor),
        }
    }

    /// Hands the plan to the runtime so the caller can acknowledge its
    /// envelope without waiting for N chat posts to land.
    pub fn spawn_run(
        &self,
        trigger: FanoutTrigger,
        request: ApprovalRequest,
        acting_card: Option<MessageRef>,
        correlation_id: String,
    ) {
        let executor = self.clone();
        tokio::spawn(async move {
            executor
                .run(&trigger, &request, acting_card.as_ref(), &correlation_id)
                .await;
        });
    }

    /// Runs the plan for one transition against a request snapshot.
    ///
    /// `acting_card` is the message container the decision arrived from, used
    /// to refresh the acting approver's card even when no address was
    /// recorded for them at creation time.
    pub async fn run(
        &self,
        trigger: &FanoutTrigger,
        request: &ApprovalRequest,
        acting_card: Option<&MessageRef>,
        correlation_id: &str,
    ) {
        let names = self.resolve_names(request).await;
        let actor = Self::trigger_actor(trigger);
        let notifications = plan(trigger, request);
        let planned = notifications.len();
        let mut failed = 0usize;

        for notification in notifications {
            if let Err(error) = self
                .deliver(&notification, request, actor, acting_card, &names)
                .await
            {
                failed += 1;
                warn!(
                    event_name = "notify.delivery_failed",
                    correlation_id,
                    request_id = %request.id,
                    error = %error,
                    "skipping failed delivery"
                );
            }
        }

        info!(
            event_name = "notify.plan_complete",
            correlation_id,
            request_id = %request.id,
            planned,
            failed,
        );
    }

    async fn deliver(
        &self,
        notification: &Notification,
        request: &ApprovalRequest,
        actor: Option<&UserId>,
        acting_card: Option<&MessageRef>,
        names: &Names,
    ) -> Result<(), DeliveryError> {
        match notification {
            Notification::DecisionCard { approver } => {
                let card = blocks::decision_card(request, names);
                let delivered = self
                    .api
                    .post_message(&ChannelId(approver.0.clone()), &card)
                    .await?;
                let _ = self.store.mutate(&request.id, |stored| {
                    stored.record_card_ref(approver.clone(), delivered.clone());
                });
                Ok(())
            }
            Notification::CardRefresh { approver } => {
                let card_ref = match request.card_ref(approver) {
                    Some(stored) => stored,
                    None if actor == Some(approver) => match acting_card {
                        Some(container) => container,
                        None => return Err(DeliveryError::MissingCardRef(approver.clone())),
                    },
                    None => return Err(DeliveryError::MissingCardRef(approver.clone())),
                };
                let card = blocks::updated_card(request, names);
                self.api.update_message(card_ref, &card).await?;
                Ok(())
            }
            Notification::Requester(note) => {
                let message = match note {
                    RequesterNote::Submitted => blocks::requester_confirmation(request),
                    RequesterNote::Progress { actor } => {
                        blocks::requester_progress(request, actor, names)
                    }
                    RequesterNote::Completed => blocks::requester_completion(request, names),
                    RequesterNote::Rejected { rejecter } => {
                        blocks::requester_rejection(request, rejecter, names)
                    }
                };
                self.api
                    .post_message(&ChannelId(request.requester_id.0.clone()), &message)
                    .await?;
                Ok(())
            }
            Notification::ApproverNote { approver, note } => {
                let message = match note {
                    ApproverNote::Completed => blocks::approver_completion(request, names),
                    ApproverNote::Rejected { rejecter } => {
                        blocks::approver_rejection(request, rejecter, names)
                    }
                };
                self.api
                    .post_message(&ChannelId(approver.0.clone()), &message)
                    .await?;
                Ok(())
            }
            Notification::ActorNotice { actor } => {
                self.api
                    .post_message(&ChannelId(actor.0.clone()), &blocks::no_longer_active_notice())
                    .await?;
                Ok(())
            }
            Notification::Audit(kind) => {
                let Some(destinations) = &self.destinations else {
                    warn!(
                        event_name = "notify.audit_skipped",
                        request_id = %request.id,
                        "destination store unavailable"
                    );
                    return Ok(());
                };
                let Some(channel) = destinations.get(&request.team_id) else {
                    warn!(
                        event_name = "notify.audit_skipped",
                        request_id = %request.id,
                        team_id = %request.team_id,
                        "no logging destination configured"
                    );
                    return Ok(());
                };
                let summary = blocks::audit_summary(*kind, request, actor, names);
                self.api.post_message(&channel, &summary).await?;
                Ok(())
            }
        }
    }
}

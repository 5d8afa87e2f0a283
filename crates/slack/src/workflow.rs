use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use signoff_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use signoff_core::destinations::DestinationStore;
use signoff_core::domain::{
    ChannelId, Decision, MessageRef, RequestDraft, RequestId, TeamId, UserId,
};
use signoff_core::errors::WorkflowError;
use signoff_core::fanout::FanoutTrigger;
use signoff_core::lifecycle::{decide, DecisionError, LifecyclePolicy};
use signoff_core::store::RequestStore;

use crate::api::ChatApi;
use crate::blocks::{self, MessageTemplate, Names};
use crate::directory::Directory;
use crate::events::{DestinationAdmin, EventContext, ServiceError, WorkflowService};
use crate::notify::NotificationExecutor;
use crate::views;

/// The approval workflow behind the event handlers: accepts submissions,
/// applies decisions, and drives the notification fan-out for whatever
/// each transition owes.
pub struct ApprovalWorkflow {
    store: Arc<RequestStore>,
    policy: LifecyclePolicy,
    api: Arc<dyn ChatApi>,
    directory: Arc<dyn Directory>,
    destinations: Option<Arc<DestinationStore>>,
    executor: NotificationExecutor,
    audit: Arc<dyn AuditSink>,
}

impl ApprovalWorkflow {
    pub fn new(
        store: Arc<RequestStore>,
        policy: LifecyclePolicy,
        api: Arc<dyn ChatApi>,
        directory: Arc<dyn Directory>,
        destinations: Option<Arc<DestinationStore>>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let executor = NotificationExecutor::new(
            api.clone(),
            directory.clone(),
            store.clone(),
            destinations.clone(),
        );
        Self { store, policy, api, directory, destinations, executor, audit }
    }

    async fn resolve_names(&self, users: impl IntoIterator<Item = UserId>) -> Names {
        let mut names = Names::new();
        for user in users {
            if !names.contains_key(&user) {
                let name = self.directory.display_name(&user).await;
                names.insert(user, name);
            }
        }
        names
    }
}

#[async_trait]
impl WorkflowService for ApprovalWorkflow {
    async fn open_request_modal(
        &self,
        trigger_id: &str,
        ctx: &EventContext,
    ) -> Result<(), ServiceError> {
        self.api.open_view(trigger_id, &views::request_modal()).await?;
        info!(
            event_name = "workflow.modal_opened",
            correlation_id = %ctx.correlation_id,
        );
        Ok(())
    }

    async fn submit(
        &self,
        draft: RequestDraft,
        ctx: &EventContext,
    ) -> Result<RequestId, ServiceError> {
        let team_id = draft.team_id.clone();
        let actor = draft.requester_id.clone();
        let request_id = self
            .store
            .create(draft)
            .map_err(|error| ServiceError::Workflow(WorkflowError::from(error)))?;
        let request = self
            .store
            .get(&request_id)
            .ok_or_else(|| {
                ServiceError::Workflow(WorkflowError::from(DecisionError::NotFound(
                    request_id.clone(),
                )))
            })?;

        info!(
            event_name = "workflow.request_created",
            correlation_id = %ctx.correlation_id,
            request_id = %request_id,
            approver_count = request.approver_ids.len(),
        );
        self.audit.emit(
            AuditEvent::new(
                &AuditContext::new(
                    Some(request_id.clone()),
                    Some(team_id),
                    ctx.correlation_id.clone(),
                    actor.0,
                ),
                "lifecycle.request_created",
                AuditCategory::Lifecycle,
                AuditOutcome::Success,
            )
            .with_metadata("approver_count", request.approver_ids.len().to_string()),
        );

        // Off the ack path: the envelope must not wait on N chat posts.
        self.executor.spawn_run(
            FanoutTrigger::Created,
            request,
            None,
            ctx.correlation_id.clone(),
        );
        Ok(request_id)
    }

    async fn decide(
        &self,
        request_id: &RequestId,
        actor: &UserId,
        decision: Decision,
        container: Option<MessageRef>,
        ctx: &EventContext,
    ) -> Result<(), ServiceError> {
        let outcome = match decide(&self.store, self.policy, request_id, actor, decision) {
            Ok(outcome) => outcome,
            Err(DecisionError::NotFound(id)) => {
                // An unknown id usually means a card outlived a restart. Tell
                // the actor directly instead of failing the event.
                self.api
                    .post_message(
                        &ChannelId(actor.0.clone()),
                        &blocks::no_longer_active_notice(),
                    )
                    .await?;
                info!(
                    event_name = "workflow.decision_on_unknown_request",
                    correlation_id = %ctx.correlation_id,
                    request_id = %id,
                    actor = %actor,
                );
                return Ok(());
            }
            Err(error) => return Err(ServiceError::Workflow(WorkflowError::from(error))),
        };

        info!(
            event_name = "workflow.decision_applied",
            correlation_id = %ctx.correlation_id,
            request_id = %request_id,
            actor = %actor,
            decision = decision.as_str(),
            transition = outcome.transition.as_str(),
        );
        self.audit.emit(
            AuditEvent::new(
                &AuditContext::new(
                    Some(request_id.clone()),
                    Some(outcome.snapshot.team_id.clone()),
                    ctx.correlation_id.clone(),
                    actor.0.clone(),
                ),
                "lifecycle.decision_applied",
                AuditCategory::Lifecycle,
                AuditOutcome::Success,
            )
            .with_metadata("decision", decision.as_str())
            .with_metadata("transition", outcome.transition.as_str()),
        );

        let trigger = FanoutTrigger::for_decision(outcome.transition, actor.clone());
        self.executor.spawn_run(
            trigger,
            outcome.snapshot,
            container,
            ctx.correlation_id.clone(),
        );
        Ok(())
    }

    async fn status(&self, request_id: &RequestId) -> Result<MessageTemplate, ServiceError> {
        let request = self.store.get(request_id).ok_or_else(|| {
            ServiceError::Workflow(WorkflowError::from(DecisionError::NotFound(
                request_id.clone(),
            )))
        })?;

        let mut users = vec![request.requester_id.clone()];
        users.extend(request.approver_ids.iter().cloned());
        let names = self.resolve_names(users).await;
        Ok(blocks::status_reply(&request, &names))
    }
}

#[async_trait]
impl DestinationAdmin for ApprovalWorkflow {
    /// Joins the channel before persisting it, so a saved destination is one
    /// the bot can actually post to. A failed join keeps the prior mapping.
    async fn set_logging_destination(
        &self,
        team: TeamId,
        channel: ChannelId,
        ctx: &EventContext,
    ) -> Result<(), ServiceError> {
        let Some(destinations) = &self.destinations else {
            return Err(ServiceError::Workflow(WorkflowError::Join {
                channel: channel.0,
                reason: "destination store unavailable".to_owned(),
            }));
        };

        self.api.join_channel(&channel).await.map_err(|error| {
            ServiceError::Workflow(WorkflowError::Join {
                channel: channel.0.clone(),
                reason: error.to_string(),
            })
        })?;

        destinations
            .set(team.clone(), channel.clone())
            .map_err(|error| ServiceError::Workflow(WorkflowError::from(error)))?;

        info!(
            event_name = "workflow.logging_destination_set",
            correlation_id = %ctx.correlation_id,
            team_id = %team,
            channel_id = %channel,
        );
        self.audit.emit(AuditEvent::new(
            &AuditContext::new(None, Some(team), ctx.correlation_id.clone(), "admin"),
            "configuration.logging_destination_set",
            AuditCategory::Configuration,
            AuditOutcome::Success,
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use signoff_core::audit::InMemoryAuditSink;
    use signoff_core::destinations::DestinationStore;
    use signoff_core::domain::{
        ApprovalStatus, ChannelId, Decision, RequestDraft, TeamId, UserId,
    };
    use signoff_core::lifecycle::LifecyclePolicy;
    use signoff_core::store::RequestStore;

    use crate::api::{RecordedCall, RecordingChatApi};
    use crate::directory::StaticDirectory;
    use crate::events::{
        DestinationAdmin, EventContext, ServiceError, WorkflowService,
    };

    use super::ApprovalWorkflow;

    fn user(id: &str) -> UserId {
        UserId(id.to_string())
    }

    fn draft(approvers: &[&str]) -> RequestDraft {
        RequestDraft {
            requester_id: user("U-REQ"),
            approver_ids: approvers.iter().map(|id| user(id)).collect(),
            url: "https://example.com/doc".to_string(),
            details: "Review the doc".to_string(),
            team_id: TeamId("T-1".to_string()),
        }
    }

    /// Lets spawned fan-out tasks run to completion on the test runtime.
    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    struct Fixture {
        api: Arc<RecordingChatApi>,
        store: Arc<RequestStore>,
        audit: InMemoryAuditSink,
        destinations: Arc<DestinationStore>,
        workflow: ApprovalWorkflow,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let destinations =
            Arc::new(DestinationStore::open(dir.path().join("dest.json")).expect("open store"));
        let api = Arc::new(RecordingChatApi::new());
        let store = Arc::new(RequestStore::new());
        let audit = InMemoryAuditSink::default();
        let workflow = ApprovalWorkflow::new(
            store.clone(),
            LifecyclePolicy::default(),
            api.clone(),
            Arc::new(StaticDirectory::new()),
            Some(destinations.clone()),
            Arc::new(audit.clone()),
        );
        Fixture { api, store, audit, destinations, workflow, _dir: dir }
    }

    #[tokio::test]
    async fn submission_stores_the_request_and_fans_out() {
        let fixture = fixture();
        fixture
            .destinations
            .set(TeamId("T-1".to_string()), ChannelId("C-AUDIT".to_string()))
            .expect("seed destination");

        let id = fixture
            .workflow
            .submit(draft(&["U-A", "U-B"]), &EventContext::default())
            .await
            .expect("submission");
        settle().await;

        let stored = fixture.store.get(&id).expect("stored request");
        assert_eq!(stored.status, ApprovalStatus::Pending);
        assert_eq!(stored.card_refs.len(), 2);

        // Two cards, the requester confirmation, and the audit summary.
        assert_eq!(fixture.api.calls().len(), 4);
        let events = fixture.audit.events();
        assert_eq!(events[0].event_type, "lifecycle.request_created");
    }

    #[tokio::test]
    async fn submission_returns_before_the_fan_out_lands() {
        let fixture = fixture();

        let id = fixture
            .workflow
            .submit(draft(&["U-A"]), &EventContext::default())
            .await
            .expect("submission");

        // The state change is visible immediately; the chat posts run on a
        // spawned task so the caller can acknowledge its envelope first.
        assert!(fixture.store.get(&id).is_some());
        assert!(fixture.api.calls().is_empty());

        settle().await;
        assert!(!fixture.api.calls().is_empty());
    }

    #[tokio::test]
    async fn full_approval_flows_through_decisions_to_terminal_state() {
        let fixture = fixture();
        let id = fixture
            .workflow
            .submit(draft(&["U-A", "U-B"]), &EventContext::default())
            .await
            .expect("submission");
        settle().await;

        fixture
            .workflow
            .decide(&id, &user("U-A"), Decision::Approve, None, &EventContext::default())
            .await
            .expect("first approval");
        assert_eq!(
            fixture.store.get(&id).expect("stored").status,
            ApprovalStatus::Pending
        );

        fixture
            .workflow
            .decide(&id, &user("U-B"), Decision::Approve, None, &EventContext::default())
            .await
            .expect("second approval");
        assert_eq!(
            fixture.store.get(&id).expect("stored").status,
            ApprovalStatus::Approved
        );

        let transitions: Vec<String> = fixture
            .audit
            .events()
            .iter()
            .filter_map(|event| event.metadata.get("transition").cloned())
            .collect();
        assert_eq!(transitions, ["partial_approval", "full_approval"]);
    }

    #[tokio::test]
    async fn unknown_request_notifies_the_actor_instead_of_failing() {
        let fixture = fixture();

        fixture
            .workflow
            .decide(
                &signoff_core::domain::RequestId("req-gone".to_string()),
                &user("U-A"),
                Decision::Approve,
                None,
                &EventContext::default(),
            )
            .await
            .expect("unknown id is not an event failure");

        let calls = fixture.api.calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(
            &calls[0],
            RecordedCall::PostMessage { channel, message }
                if channel.0 == "U-A" && message.fallback_text.contains("no longer active")
        ));
    }

    #[tokio::test]
    async fn status_resolves_names_for_the_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let api = Arc::new(RecordingChatApi::new());
        let store = Arc::new(RequestStore::new());
        let workflow = ApprovalWorkflow::new(
            store.clone(),
            LifecyclePolicy::default(),
            api,
            Arc::new(StaticDirectory::new().with_name("U-REQ", "Riley")),
            Some(Arc::new(
                DestinationStore::open(dir.path().join("dest.json")).expect("open store"),
            )),
            Arc::new(InMemoryAuditSink::default()),
        );
        let id = workflow
            .submit(draft(&["U-A"]), &EventContext::default())
            .await
            .expect("submission");

        let message = workflow.status(&id).await.expect("status");
        let rendered = serde_json::to_string(&message).expect("serialize");
        assert!(rendered.contains("Riley"));

        let missing = workflow
            .status(&signoff_core::domain::RequestId("req-none".to_string()))
            .await;
        assert!(matches!(missing, Err(ServiceError::Workflow(_))));
    }

    #[tokio::test]
    async fn logging_destination_joins_before_persisting() {
        let fixture = fixture();

        fixture
            .workflow
            .set_logging_destination(
                TeamId("T-1".to_string()),
                ChannelId("C-AUDIT".to_string()),
                &EventContext::default(),
            )
            .await
            .expect("destination set");

        assert!(matches!(
            &fixture.api.calls()[0],
            RecordedCall::JoinChannel { channel } if channel.0 == "C-AUDIT"
        ));
        assert_eq!(
            fixture.destinations.get(&TeamId("T-1".to_string())),
            Some(ChannelId("C-AUDIT".to_string()))
        );
    }

    #[tokio::test]
    async fn failed_join_keeps_the_prior_destination() {
        let fixture = fixture();
        fixture
            .destinations
            .set(TeamId("T-1".to_string()), ChannelId("C-OLD".to_string()))
            .expect("seed destination");

        fixture.api.script_failure("channel_not_found");
        let error = fixture
            .workflow
            .set_logging_destination(
                TeamId("T-1".to_string()),
                ChannelId("C-NEW".to_string()),
                &EventContext::default(),
            )
            .await
            .expect_err("join failure");

        assert!(error.user_message().contains("Could not join"));
        assert_eq!(
            fixture.destinations.get(&TeamId("T-1".to_string())),
            Some(ChannelId("C-OLD".to_string()))
        );
    }
}

use serde::{Deserialize, Serialize};

use crate::domain::{ApprovalRequest, UserId};
use crate::lifecycle::Transition;

/// The state change a fan-out is announcing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FanoutTrigger {
    Created,
    PartialApproval { actor: UserId },
    FullApproval { actor: UserId },
    Rejected { actor: UserId },
    NoOpAlreadyFinal { actor: UserId },
}

impl FanoutTrigger {
    pub fn for_decision(transition: Transition, actor: UserId) -> Self {
        match transition {
            Transition::PartialApproval => Self::PartialApproval { actor },
            Transition::FullApproval => Self::FullApproval { actor },
            Transition::Rejected => Self::Rejected { actor },
            Transition::NoOpAlreadyFinal => Self::NoOpAlreadyFinal { actor },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequesterNote {
    Submitted,
    Progress { actor: UserId },
    Completed,
    Rejected { rejecter: UserId },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApproverNote {
    Completed,
    Rejected { rejecter: UserId },
}

/// Summary posted to the tenant's logging destination. The bullet fields are
/// rendered by the executor from the request snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Created,
    PartialApproval,
    FullApproval,
    Rejected,
}

impl AuditKind {
    pub fn headline(&self) -> &'static str {
        match self {
            Self::Created => "🆕 New Approval Request",
            Self::PartialApproval => "👍 Partial Approval",
            Self::FullApproval => "✅ Approval Request Completed",
            Self::Rejected => "❌ Approval Request Rejected",
        }
    }
}

/// One outbound message owed to somebody after a state transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    /// Actionable decision card delivered to one approver.
    DecisionCard { approver: UserId },
    /// Edit an already delivered card in place.
    CardRefresh { approver: UserId },
    Requester(RequesterNote),
    ApproverNote { approver: UserId, note: ApproverNote },
    /// Tells the acting approver their decision landed after the request was
    /// already settled.
    ActorNotice { actor: UserId },
    Audit(AuditKind),
}

/// Turns a transition into the ordered list of notifications to deliver.
///
/// Pure by construction: rendering and delivery live with the executor, so
/// this table is testable without a transport. Order within one plan is the
/// delivery order; failures during delivery are isolated per entry and never
/// re-enter the plan.
pub fn plan(trigger: &FanoutTrigger, request: &ApprovalRequest) -> Vec<Notification> {
    let mut notifications = Vec::new();

    match trigger {
        FanoutTrigger::Created => {
            for approver in &request.approver_ids {
                notifications.push(Notification::DecisionCard { approver: approver.clone() });
            }
            notifications.push(Notification::Requester(RequesterNote::Submitted));
            notifications.push(Notification::Audit(AuditKind::Created));
        }
        FanoutTrigger::PartialApproval { actor } => {
            notifications.push(Notification::CardRefresh { approver: actor.clone() });
            notifications
                .push(Notification::Requester(RequesterNote::Progress { actor: actor.clone() }));
            notifications.push(Notification::Audit(AuditKind::PartialApproval));
        }
        FanoutTrigger::FullApproval { actor: _ } => {
            for approver in &request.approver_ids {
                notifications.push(Notification::CardRefresh { approver: approver.clone() });
            }
            notifications.push(Notification::Requester(RequesterNote::Completed));
            for approver in &request.approver_ids {
                notifications.push(Notification::ApproverNote {
                    approver: approver.clone(),
                    note: ApproverNote::Completed,
                });
            }
            notifications.push(Notification::Audit(AuditKind::FullApproval));
        }
        FanoutTrigger::Rejected { actor } => {
            for approver in &request.approver_ids {
                notifications.push(Notification::CardRefresh { approver: approver.clone() });
            }
            notifications.push(Notification::Requester(RequesterNote::Rejected {
                rejecter: actor.clone(),
            }));
            for approver in &request.approver_ids {
                if approver == actor {
                    continue;
                }
                notifications.push(Notification::ApproverNote {
                    approver: approver.clone(),
                    note: ApproverNote::Rejected { rejecter: actor.clone() },
                });
            }
            notifications.push(Notification::Audit(AuditKind::Rejected));
        }
        FanoutTrigger::NoOpAlreadyFinal { actor } => {
            notifications.push(Notification::ActorNotice { actor: actor.clone() });
        }
    }

    notifications
}

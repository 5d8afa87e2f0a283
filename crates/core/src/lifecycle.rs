use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ApprovalRequest, ApprovalStatus, Decision, RequestId, UserId};
use crate::store::RequestStore;

/// What a decision did to a request. Drives the notification fan-out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    PartialApproval,
    FullApproval,
    Rejected,
    NoOpAlreadyFinal,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PartialApproval => "partial_approval",
            Self::FullApproval => "full_approval",
            Self::Rejected => "rejected",
            Self::NoOpAlreadyFinal => "no_op_already_final",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecisionError {
    #[error("approval request `{0}` was not found")]
    NotFound(RequestId),
    #[error("`{actor}` is not on the approver roster for request `{request_id}`")]
    NotAnApprover { request_id: RequestId, actor: UserId },
}

/// Feature switches for decision handling.
///
/// `enforce_roster` defaults to off: any identity that reaches the decision
/// controls is recorded, exactly as the chat surface delivered it. Turning it
/// on refuses decisions from outside the roster before anything mutates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LifecyclePolicy {
    pub enforce_roster: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionOutcome {
    pub transition: Transition,
    pub snapshot: ApprovalRequest,
}

/// Applies one decision to a request already held under its store lock.
///
/// Terminal requests are left untouched and classified `NoOpAlreadyFinal`.
/// Unanimity across the roster approves; a single rejection is terminal no
/// matter how many approvals were already recorded.
pub fn apply_decision(
    request: &mut ApprovalRequest,
    actor: &UserId,
    decision: Decision,
    policy: LifecyclePolicy,
) -> Result<Transition, DecisionError> {
    if request.status.is_terminal() {
        return Ok(Transition::NoOpAlreadyFinal);
    }

    if policy.enforce_roster && !request.is_approver(actor) {
        return Err(DecisionError::NotAnApprover {
            request_id: request.id.clone(),
            actor: actor.clone(),
        });
    }

    match decision {
        Decision::Approve => {
            request.approvals.insert(actor.clone());
            if request.all_approved() {
                request.status = ApprovalStatus::Approved;
                Ok(Transition::FullApproval)
            } else {
                Ok(Transition::PartialApproval)
            }
        }
        Decision::Reject => {
            request.rejections.insert(actor.clone());
            request.status = ApprovalStatus::Rejected;
            Ok(Transition::Rejected)
        }
    }
}

/// Resolves the request in the store and applies the decision atomically for
/// that id. Unknown ids fail with `NotFound`; everything else comes back as
/// a classified outcome with the post-mutation snapshot.
pub fn decide(
    store: &RequestStore,
    policy: LifecyclePolicy,
    request_id: &RequestId,
    actor: &UserId,
    decision: Decision,
) -> Result<DecisionOutcome, DecisionError> {
    match store.mutate(request_id, |request| {
        let transition = apply_decision(request, actor, decision, policy)?;
        Ok(DecisionOutcome { transition, snapshot: request.clone() })
    }) {
        Some(result) => result,
        None => Err(DecisionError::NotFound(request_id.clone())),
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::{ApprovalStatus, Decision, RequestDraft, RequestId, TeamId, UserId};
    use crate::store::RequestStore;

    use super::{decide, DecisionError, LifecyclePolicy, Transition};

    fn user(id: &str) -> UserId {
        UserId(id.to_string())
    }

    fn seeded_store(approvers: &[&str]) -> (RequestStore, RequestId) {
        let store = RequestStore::new();
        let id = store
            .create(RequestDraft {
                requester_id: user("U-REQ"),
                approver_ids: approvers.iter().map(|id| user(id)).collect(),
                url: "https://example.com/doc".to_string(),
                details: "Review the doc".to_string(),
                team_id: TeamId("T-1".to_string()),
            })
            .expect("create");
        (store, id)
    }

    #[test]
    fn two_approvals_reach_full_approval() {
        let (store, id) = seeded_store(&["U-X", "U-Y"]);
        let policy = LifecyclePolicy::default();

        let first = decide(&store, policy, &id, &user("U-X"), Decision::Approve)
            .expect("first approval");
        assert_eq!(first.transition, Transition::PartialApproval);
        assert_eq!(first.snapshot.status, ApprovalStatus::Pending);
        assert!(first.snapshot.approvals.contains(&user("U-X")));

        let second = decide(&store, policy, &id, &user("U-Y"), Decision::Approve)
            .expect("second approval");
        assert_eq!(second.transition, Transition::FullApproval);
        assert_eq!(second.snapshot.status, ApprovalStatus::Approved);
    }

    #[test]
    fn rejection_is_terminal_and_later_decisions_are_no_ops() {
        let (store, id) = seeded_store(&["U-X", "U-Y"]);
        let policy = LifecyclePolicy::default();

        let rejected =
            decide(&store, policy, &id, &user("U-X"), Decision::Reject).expect("rejection");
        assert_eq!(rejected.transition, Transition::Rejected);
        assert_eq!(rejected.snapshot.status, ApprovalStatus::Rejected);
        assert!(rejected.snapshot.rejections.contains(&user("U-X")));

        let late = decide(&store, policy, &id, &user("U-Y"), Decision::Approve)
            .expect("late approval is not an error");
        assert_eq!(late.transition, Transition::NoOpAlreadyFinal);
        assert_eq!(late.snapshot.status, ApprovalStatus::Rejected);
        assert!(!late.snapshot.approvals.contains(&user("U-Y")));
    }

    #[test]
    fn single_veto_overrides_prior_approvals() {
        let (store, id) = seeded_store(&["U-A", "U-B", "U-C"]);
        let policy = LifecyclePolicy::default();

        decide(&store, policy, &id, &user("U-A"), Decision::Approve).expect("approve a");
        decide(&store, policy, &id, &user("U-B"), Decision::Approve).expect("approve b");
        let veto = decide(&store, policy, &id, &user("U-C"), Decision::Reject).expect("veto");

        assert_eq!(veto.transition, Transition::Rejected);
        assert_eq!(veto.snapshot.status, ApprovalStatus::Rejected);
        assert_eq!(veto.snapshot.approvals.len(), 2);
    }

    #[test]
    fn approval_order_does_not_change_the_final_state() {
        let roster = ["U-A", "U-B", "U-C"];
        let orders: [[usize; 3]; 6] =
            [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];

        for order in orders {
            let (store, id) = seeded_store(&roster);
            let policy = LifecyclePolicy::default();
            let mut last = None;
            for index in order {
                last = Some(
                    decide(&store, policy, &id, &user(roster[index]), Decision::Approve)
                        .expect("approval"),
                );
            }
            let last = last.expect("three decisions ran");
            assert_eq!(last.transition, Transition::FullApproval);
            assert_eq!(last.snapshot.status, ApprovalStatus::Approved);
        }
    }

    #[test]
    fn terminal_requests_never_mutate_again() {
        let (store, id) = seeded_store(&["U-X"]);
        let policy = LifecyclePolicy::default();

        decide(&store, policy, &id, &user("U-X"), Decision::Approve).expect("full approval");
        let settled = store.get(&id).expect("snapshot");

        for decision in [Decision::Approve, Decision::Reject] {
            let outcome =
                decide(&store, policy, &id, &user("U-LATE"), decision).expect("no-op outcome");
            assert_eq!(outcome.transition, Transition::NoOpAlreadyFinal);
            assert_eq!(outcome.snapshot, settled);
        }
    }

    #[test]
    fn unknown_request_is_not_found_and_creates_nothing() {
        let (store, _) = seeded_store(&["U-X"]);
        let missing = RequestId("req-69a1a5e0".to_string());

        let error = decide(&store, LifecyclePolicy::default(), &missing, &user("U-X"), Decision::Approve)
            .expect_err("unknown id must fail");
        assert_eq!(error, DecisionError::NotFound(missing.clone()));
        assert!(store.get(&missing).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn outsiders_are_recorded_unless_roster_is_enforced() {
        let (store, id) = seeded_store(&["U-A", "U-B"]);

        let permissive = decide(
            &store,
            LifecyclePolicy { enforce_roster: false },
            &id,
            &user("U-OUTSIDER"),
            Decision::Approve,
        )
        .expect("permissive mode accepts outsiders");
        assert_eq!(permissive.transition, Transition::PartialApproval);
        assert!(permissive.snapshot.approvals.contains(&user("U-OUTSIDER")));

        let (store, id) = seeded_store(&["U-A", "U-B"]);
        let error = decide(
            &store,
            LifecyclePolicy { enforce_roster: true },
            &id,
            &user("U-OUTSIDER"),
            Decision::Approve,
        )
        .expect_err("enforced mode refuses outsiders");
        assert!(matches!(error, DecisionError::NotAnApprover { .. }));
        let untouched = store.get(&id).expect("snapshot");
        assert!(untouched.approvals.is_empty());
        assert_eq!(untouched.status, ApprovalStatus::Pending);
    }

    #[test]
    fn duplicate_approval_stays_partial_without_double_counting() {
        let (store, id) = seeded_store(&["U-A", "U-B"]);
        let policy = LifecyclePolicy::default();

        decide(&store, policy, &id, &user("U-A"), Decision::Approve).expect("first");
        let repeat = decide(&store, policy, &id, &user("U-A"), Decision::Approve).expect("repeat");

        assert_eq!(repeat.transition, Transition::PartialApproval);
        assert_eq!(repeat.snapshot.approvals.len(), 1);
    }
}

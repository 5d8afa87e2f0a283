use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(format!("req-{}", Uuid::new_v4().simple()))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    /// Opaque mention token understood by the chat surface even when a
    /// display name cannot be resolved.
    pub fn mention(&self) -> String {
        format!("<@{}>", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TeamId(pub String);

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address of a delivered message, sufficient to edit it in place later.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub channel: ChannelId,
    pub ts: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Validated submission payload; the store turns this into a stored request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestDraft {
    pub requester_id: UserId,
    pub approver_ids: Vec<UserId>,
    pub url: String,
    pub details: String,
    pub team_id: TeamId,
}

/// One approval workflow instance from submission to terminal outcome.
///
/// The roster (`approver_ids`) is fixed at creation. `approvals` and
/// `rejections` only grow, and stop growing once `status` leaves `Pending`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: RequestId,
    pub requester_id: UserId,
    pub approver_ids: Vec<UserId>,
    pub url: String,
    pub details: String,
    pub status: ApprovalStatus,
    pub approvals: BTreeSet<UserId>,
    pub rejections: BTreeSet<UserId>,
    pub team_id: TeamId,
    pub created_at: DateTime<Utc>,
    /// Decision-card address per approver, recorded as cards are delivered
    /// so later transitions can edit them in place.
    pub card_refs: BTreeMap<UserId, MessageRef>,
}

impl ApprovalRequest {
    pub fn from_draft(id: RequestId, draft: RequestDraft) -> Self {
        Self {
            id,
            requester_id: draft.requester_id,
            approver_ids: draft.approver_ids,
            url: draft.url,
            details: draft.details,
            status: ApprovalStatus::Pending,
            approvals: BTreeSet::new(),
            rejections: BTreeSet::new(),
            team_id: draft.team_id,
            created_at: Utc::now(),
            card_refs: BTreeMap::new(),
        }
    }

    pub fn is_approver(&self, user: &UserId) -> bool {
        self.approver_ids.contains(user)
    }

    /// True once every roster member has approved. Extra approvals from
    /// outside the roster never count toward unanimity.
    pub fn all_approved(&self) -> bool {
        self.approver_ids.iter().all(|id| self.approvals.contains(id))
    }

    /// Roster members who have not approved yet, in roster order.
    pub fn remaining_approvers(&self) -> Vec<UserId> {
        self.approver_ids.iter().filter(|id| !self.approvals.contains(id)).cloned().collect()
    }

    pub fn record_card_ref(&mut self, approver: UserId, message_ref: MessageRef) {
        self.card_refs.insert(approver, message_ref);
    }

    pub fn card_ref(&self, approver: &UserId) -> Option<&MessageRef> {
        self.card_refs.get(approver)
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::domain::{ApprovalRequest, RequestDraft, RequestId, UserId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("an approval request needs at least one approver")]
    EmptyRoster,
    #[error("an approval request needs a URL")]
    MissingUrl,
    #[error("an approval request needs details")]
    MissingDetails,
}

/// Authoritative in-memory home of every approval request.
///
/// The outer lock guards only the id -> entry map and is held just long
/// enough to clone the entry handle. Each request sits behind its own lock,
/// so two decisions racing on the same id serialize (the second observes the
/// first's effect) while unrelated ids proceed in parallel. Requests are
/// never deleted; terminal ones stay around for historical display.
#[derive(Default)]
pub struct RequestStore {
    requests: Mutex<HashMap<RequestId, Arc<Mutex<ApprovalRequest>>>>,
}

impl RequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the draft, assigns a fresh id, and stores the request.
    /// Duplicate roster entries are collapsed, keeping first-occurrence
    /// order.
    pub fn create(&self, draft: RequestDraft) -> Result<RequestId, SubmitError> {
        let draft = normalize_draft(draft)?;
        let id = RequestId::generate();
        let request = ApprovalRequest::from_draft(id.clone(), draft);

        let mut requests = match self.requests.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        requests.insert(id.clone(), Arc::new(Mutex::new(request)));
        Ok(id)
    }

    /// Snapshot of one request, if it exists.
    pub fn get(&self, id: &RequestId) -> Option<ApprovalRequest> {
        let entry = self.entry(id)?;
        let request = match entry.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Some(request.clone())
    }

    /// Runs `apply` under the request's own lock. Returns `None` when the id
    /// is unknown.
    pub fn mutate<T>(
        &self,
        id: &RequestId,
        apply: impl FnOnce(&mut ApprovalRequest) -> T,
    ) -> Option<T> {
        let entry = self.entry(id)?;
        let mut request = match entry.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Some(apply(&mut request))
    }

    pub fn len(&self) -> usize {
        let requests = match self.requests.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, id: &RequestId) -> Option<Arc<Mutex<ApprovalRequest>>> {
        let requests = match self.requests.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        requests.get(id).cloned()
    }
}

fn normalize_draft(mut draft: RequestDraft) -> Result<RequestDraft, SubmitError> {
    let mut seen = std::collections::HashSet::new();
    let mut roster: Vec<UserId> = Vec::with_capacity(draft.approver_ids.len());
    for approver in draft.approver_ids {
        if seen.insert(approver.clone()) {
            roster.push(approver);
        }
    }
    if roster.is_empty() {
        return Err(SubmitError::EmptyRoster);
    }
    draft.approver_ids = roster;

    draft.url = draft.url.trim().to_string();
    if draft.url.is_empty() {
        return Err(SubmitError::MissingUrl);
    }
    draft.details = draft.details.trim().to_string();
    if draft.details.is_empty() {
        return Err(SubmitError::MissingDetails);
    }

    Ok(draft)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::domain::{RequestDraft, RequestId, TeamId, UserId};

    use super::{RequestStore, SubmitError};

    fn draft(approvers: &[&str]) -> RequestDraft {
        RequestDraft {
            requester_id: UserId("U-REQ".to_string()),
            approver_ids: approvers.iter().map(|id| UserId((*id).to_string())).collect(),
            url: "https://example.com/launch".to_string(),
            details: "Launch announcement".to_string(),
            team_id: TeamId("T-1".to_string()),
        }
    }

    #[test]
    fn create_then_get_round_trips_the_request() {
        let store = RequestStore::new();
        let id = store.create(draft(&["U-A", "U-B"])).expect("create");

        let request = store.get(&id).expect("stored request");
        assert_eq!(request.id, id);
        assert_eq!(request.approver_ids.len(), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn duplicate_approvers_collapse_preserving_order() {
        let store = RequestStore::new();
        let id = store.create(draft(&["U-B", "U-A", "U-B"])).expect("create");

        let request = store.get(&id).expect("stored request");
        assert_eq!(
            request.approver_ids,
            vec![UserId("U-B".to_string()), UserId("U-A".to_string())]
        );
    }

    #[test]
    fn empty_roster_is_refused() {
        let store = RequestStore::new();
        let error = store.create(draft(&[])).expect_err("empty roster must fail");
        assert_eq!(error, SubmitError::EmptyRoster);
        assert!(store.is_empty());
    }

    #[test]
    fn blank_payload_fields_are_refused() {
        let store = RequestStore::new();

        let mut missing_url = draft(&["U-A"]);
        missing_url.url = "   ".to_string();
        assert_eq!(store.create(missing_url), Err(SubmitError::MissingUrl));

        let mut missing_details = draft(&["U-A"]);
        missing_details.details = String::new();
        assert_eq!(store.create(missing_details), Err(SubmitError::MissingDetails));
    }

    #[test]
    fn unknown_ids_resolve_to_nothing() {
        let store = RequestStore::new();
        assert!(store.get(&RequestId("req-missing".to_string())).is_none());
        assert!(store.mutate(&RequestId("req-missing".to_string()), |_| ()).is_none());
    }

    #[test]
    fn concurrent_mutations_on_one_id_do_not_lose_updates() {
        let store = Arc::new(RequestStore::new());
        let roster: Vec<String> = (0..16).map(|n| format!("U-{n}")).collect();
        let roster_refs: Vec<&str> = roster.iter().map(String::as_str).collect();
        let id = store.create(draft(&roster_refs)).expect("create");

        let mut handles = Vec::new();
        for approver in roster.clone() {
            let store = Arc::clone(&store);
            let id = id.clone();
            handles.push(std::thread::spawn(move || {
                store
                    .mutate(&id, |request| {
                        request.approvals.insert(UserId(approver));
                    })
                    .expect("request exists");
            }));
        }
        for handle in handles {
            handle.join().expect("mutation thread");
        }

        let request = store.get(&id).expect("stored request");
        assert_eq!(request.approvals.len(), roster.len());
        assert!(request.all_approved());
    }
}

use std::collections::BTreeMap;

use serde_json::{json, Value};

use signoff_core::domain::{RequestDraft, TeamId, UserId};

/// Callback id stamped on the request modal so submissions can be routed
/// back to the workflow.
pub const REQUEST_MODAL_CALLBACK_ID: &str = "signoff.request.v1";

pub const APPROVERS_BLOCK_ID: &str = "approvers_block";
pub const APPROVERS_INPUT_ID: &str = "approvers_input";
pub const URL_BLOCK_ID: &str = "url_block";
pub const URL_INPUT_ID: &str = "url_input";
pub const DETAILS_BLOCK_ID: &str = "details_block";
pub const DETAILS_INPUT_ID: &str = "details_input";

/// The `views.open` payload for a new approval request.
pub fn request_modal() -> Value {
    json!({
        "type": "modal",
        "callback_id": REQUEST_MODAL_CALLBACK_ID,
        "title": { "type": "plain_text", "text": "New Approval Request" },
        "submit": { "type": "plain_text", "text": "Submit" },
        "close": { "type": "plain_text", "text": "Cancel" },
        "blocks": [
            {
                "type": "input",
                "block_id": APPROVERS_BLOCK_ID,
                "label": { "type": "plain_text", "text": "Select Approvers" },
                "element": {
                    "type": "multi_users_select",
                    "action_id": APPROVERS_INPUT_ID,
                    "placeholder": { "type": "plain_text", "text": "Choose one or more approvers" }
                }
            },
            {
                "type": "input",
                "block_id": URL_BLOCK_ID,
                "label": { "type": "plain_text", "text": "URL" },
                "element": {
                    "type": "plain_text_input",
                    "action_id": URL_INPUT_ID,
                    "placeholder": { "type": "plain_text", "text": "Link to the thing needing approval" }
                }
            },
            {
                "type": "input",
                "block_id": DETAILS_BLOCK_ID,
                "label": { "type": "plain_text", "text": "Details" },
                "element": {
                    "type": "plain_text_input",
                    "action_id": DETAILS_INPUT_ID,
                    "multiline": true,
                    "placeholder": { "type": "plain_text", "text": "What should the approvers look at?" }
                }
            }
        ]
    })
}

/// Field-level validation failures, keyed by block id the way the modal
/// response protocol expects.
pub type ValidationErrors = BTreeMap<String, String>;

fn state_value<'a>(state: &'a Value, block_id: &str, action_id: &str) -> Option<&'a Value> {
    state.get("values")?.get(block_id)?.get(action_id)
}

/// Extracts a [`RequestDraft`] from a `view_submission` state payload.
///
/// Empty or missing fields come back as per-block errors rather than a
/// failed parse; the caller echoes them into the open modal.
pub fn parse_submission(
    state: &Value,
    requester_id: UserId,
    team_id: TeamId,
) -> Result<RequestDraft, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let approver_ids: Vec<UserId> = state_value(state, APPROVERS_BLOCK_ID, APPROVERS_INPUT_ID)
        .and_then(|input| input.get("selected_users"))
        .and_then(Value::as_array)
        .map(|users| {
            users
                .iter()
                .filter_map(Value::as_str)
                .map(|id| UserId(id.to_string()))
                .collect()
        })
        .unwrap_or_default();
    if approver_ids.is_empty() {
        errors.insert(
            APPROVERS_BLOCK_ID.to_string(),
            "Select at least one approver.".to_string(),
        );
    }

    let url = state_value(state, URL_BLOCK_ID, URL_INPUT_ID)
        .and_then(|input| input.get("value"))
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    if url.is_empty() {
        errors.insert(URL_BLOCK_ID.to_string(), "Enter the URL to review.".to_string());
    }

    let details = state_value(state, DETAILS_BLOCK_ID, DETAILS_INPUT_ID)
        .and_then(|input| input.get("value"))
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    if details.is_empty() {
        errors.insert(
            DETAILS_BLOCK_ID.to_string(),
            "Describe what needs approval.".to_string(),
        );
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(RequestDraft { requester_id, approver_ids, url, details, team_id })
}

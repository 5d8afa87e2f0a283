use std::collections::BTreeMap;

use serde::Serialize;

use signoff_core::domain::{ApprovalRequest, ApprovalStatus, Decision, RequestId, UserId};
use signoff_core::fanout::AuditKind;

/// Action ids carried by the decision card buttons.
pub const APPROVE_ACTION_ID: &str = "approve_action";
pub const REJECT_ACTION_ID: &str = "reject_action";

/// Resolved display names, keyed by user id. Built by the executor from the
/// directory; anyone missing from the map renders as a mention token.
pub type Names = BTreeMap<UserId, String>;

pub fn display(names: &Names, user: &UserId) -> String {
    names.get(user).cloned().unwrap_or_else(|| user.mention())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    Plain { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Danger,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ButtonElement {
    pub action_id: String,
    pub text: TextObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<ButtonStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ButtonElement {
    pub fn new(action_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            text: TextObject::plain(label),
            style: None,
            value: None,
        }
    }

    pub fn style(mut self, style: ButtonStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: TextObject },
    // Slack's two-column field layout; serialized as a section with `fields`.
    #[serde(rename = "section")]
    Fields { block_id: String, fields: Vec<TextObject> },
    Actions { block_id: String, elements: Vec<ButtonElement> },
    Context { block_id: String, elements: Vec<TextObject> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn fields<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut FieldsBuilder),
    {
        let mut builder = FieldsBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Fields { block_id: block_id.into(), fields: builder.build() });
        self
    }

    pub fn actions<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ActionsBuilder),
    {
        let mut builder = ActionsBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Actions { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

#[derive(Default)]
pub struct FieldsBuilder {
    fields: Vec<TextObject>,
}

impl FieldsBuilder {
    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.fields.push(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.fields
    }
}

#[derive(Default)]
pub struct ActionsBuilder {
    elements: Vec<ButtonElement>,
}

impl ActionsBuilder {
    pub fn button(&mut self, button: ButtonElement) -> &mut Self {
        self.elements.push(button);
        self
    }

    fn build(self) -> Vec<ButtonElement> {
        self.elements
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

pub fn decision_value(decision: Decision, request_id: &RequestId) -> String {
    format!("{}_{request_id}", decision.as_str())
}

fn roster_line(request: &ApprovalRequest, names: &Names) -> String {
    request.approver_ids.iter().map(|id| display(names, id)).collect::<Vec<_>>().join(", ")
}

fn approved_line(request: &ApprovalRequest, names: &Names) -> String {
    if request.approvals.is_empty() {
        "None".to_owned()
    } else {
        request.approvals.iter().map(|id| display(names, id)).collect::<Vec<_>>().join(", ")
    }
}

fn remaining_line(request: &ApprovalRequest, names: &Names) -> String {
    request
        .remaining_approvers()
        .iter()
        .map(|id| display(names, id))
        .collect::<Vec<_>>()
        .join(", ")
}

fn rejecter_line(request: &ApprovalRequest, names: &Names) -> String {
    request
        .rejections
        .iter()
        .next()
        .map(|id| display(names, id))
        .unwrap_or_else(|| "unknown".to_owned())
}

fn status_line(request: &ApprovalRequest) -> String {
    match request.status {
        ApprovalStatus::Pending => format!(
            "{}/{} Approvals",
            request.approvals.len(),
            request.approver_ids.len()
        ),
        ApprovalStatus::Approved => "Approved ✅".to_owned(),
        ApprovalStatus::Rejected => "REJECTED".to_owned(),
    }
}

// Shared field layout for cards and notes: requester, status, roster, and
// whichever of approved/rejected applies to the current status.
fn outcome_fields(fields: &mut FieldsBuilder, request: &ApprovalRequest, names: &Names) {
    fields
        .mrkdwn(format!("*Requested By:*\n{}", display(names, &request.requester_id)))
        .mrkdwn(format!("*Status:*\n{}", status_line(request)))
        .mrkdwn(format!("*Approvers:*\n{}", roster_line(request, names)));
    if request.status == ApprovalStatus::Rejected {
        fields.mrkdwn(format!("*Rejected By:*\n{}", rejecter_line(request, names)));
    } else {
        fields.mrkdwn(format!("*Approved By:*\n{}", approved_line(request, names)));
    }
}

fn summary_text(request: &ApprovalRequest) -> String {
    format!("Approval requested:\n*{}*\n*URL:* {}", request.details, request.url)
}

fn decision_buttons(request_id: &RequestId) -> [ButtonElement; 2] {
    [
        ButtonElement::new(APPROVE_ACTION_ID, "Approve")
            .style(ButtonStyle::Primary)
            .value(decision_value(Decision::Approve, request_id)),
        ButtonElement::new(REJECT_ACTION_ID, "Reject")
            .style(ButtonStyle::Danger)
            .value(decision_value(Decision::Reject, request_id)),
    ]
}

/// The actionable card delivered to each approver at creation time.
pub fn decision_card(request: &ApprovalRequest, names: &Names) -> MessageTemplate {
    MessageBuilder::new(format!(
        "You have a new approval request:\n{}\nURL: {}",
        request.details, request.url
    ))
    .section("signoff.card.summary.v1", |section| {
        section.mrkdwn(summary_text(request));
    })
    .fields("signoff.card.fields.v1", |fields| {
        fields
            .mrkdwn(format!("*Requested By:*\n{}", display(names, &request.requester_id)))
            .mrkdwn("*Status:*\nPending")
            .mrkdwn(format!("*Approvers:*\n{}", roster_line(request, names)))
            .mrkdwn("*Required Approvals:*\nAll");
    })
    .actions("signoff.decision.v1", |actions| {
        let [approve, reject] = decision_buttons(&request.id);
        actions.button(approve).button(reject);
    })
    .build()
}

/// In-place replacement for a delivered card after a transition. Terminal
/// cards lose their action buttons; pending cards keep them and show
/// progress.
pub fn updated_card(request: &ApprovalRequest, names: &Names) -> MessageTemplate {
    match request.status {
        ApprovalStatus::Pending => {
            let received = request.approvals.len();
            let required = request.approver_ids.len();
            MessageBuilder::new(format!(
                "Approval request - {received}/{required} approvals received"
            ))
            .section("signoff.card.summary.v1", |section| {
                section.mrkdwn(summary_text(request));
            })
            .fields("signoff.card.fields.v1", |fields| {
                outcome_fields(fields, request, names);
            })
            .actions("signoff.decision.v1", |actions| {
                let [approve, reject] = decision_buttons(&request.id);
                actions.button(approve).button(reject);
            })
            .build()
        }
        ApprovalStatus::Approved => {
            MessageBuilder::new("Approval request - approved by all approvers".to_owned())
                .section("signoff.card.summary.v1", |section| {
                    section.mrkdwn(summary_text(request));
                })
                .fields("signoff.card.fields.v1", |fields| {
                    outcome_fields(fields, request, names);
                })
                .build()
        }
        ApprovalStatus::Rejected => {
            let rejecter = rejecter_line(request, names);
            MessageBuilder::new(format!("Approval request - REJECTED by {rejecter}"))
                .section("signoff.card.summary.v1", |section| {
                    section.mrkdwn(format!(
                        "{}\n\n*REJECTED* by {rejecter}",
                        summary_text(request)
                    ));
                })
                .fields("signoff.card.fields.v1", |fields| {
                    outcome_fields(fields, request, names);
                })
                .build()
        }
    }
}

pub fn requester_confirmation(request: &ApprovalRequest) -> MessageTemplate {
    let count = request.approver_ids.len();
    let plural = if count > 1 { "s" } else { "" };
    MessageBuilder::new(format!("Your request has been sent to {count} approver{plural}"))
        .section("signoff.requester.confirmation.v1", |section| {
            section.mrkdwn(format!(
                "Your request has been sent to {count} approver{plural}\n*Description*: {}\n*URL*: {}",
                request.details, request.url
            ));
        })
        .build()
}

pub fn requester_progress(
    request: &ApprovalRequest,
    actor: &UserId,
    names: &Names,
) -> MessageTemplate {
    let remaining = request.remaining_approvers().len();
    MessageBuilder::new(format!(
        "Your request was approved by {}",
        display(names, actor)
    ))
    .section("signoff.requester.progress.v1", |section| {
        section.mrkdwn(format!(
            "Your request was approved by {}. Waiting for {remaining} more approver(s):\n{}",
            display(names, actor),
            remaining_line(request, names),
        ));
    })
    .section("signoff.requester.progress.summary.v1", |section| {
        section.mrkdwn(summary_text(request));
    })
    .fields("signoff.requester.progress.fields.v1", |fields| {
        outcome_fields(fields, request, names);
    })
    .build()
}

pub fn requester_completion(request: &ApprovalRequest, names: &Names) -> MessageTemplate {
    MessageBuilder::new("Your request has been approved by all approvers!".to_owned())
        .section("signoff.requester.completion.v1", |section| {
            section.mrkdwn("Your request has been approved by all approvers!");
        })
        .section("signoff.requester.completion.summary.v1", |section| {
            section.mrkdwn(summary_text(request));
        })
        .fields("signoff.requester.completion.fields.v1", |fields| {
            outcome_fields(fields, request, names);
        })
        .build()
}

pub fn requester_rejection(
    request: &ApprovalRequest,
    rejecter: &UserId,
    names: &Names,
) -> MessageTemplate {
    MessageBuilder::new(format!("Your request was rejected by {}", display(names, rejecter)))
        .section("signoff.requester.rejection.v1", |section| {
            section.mrkdwn(format!(
                "Your request was rejected by {}.",
                display(names, rejecter),
            ));
        })
        .section("signoff.requester.rejection.summary.v1", |section| {
            section.mrkdwn(summary_text(request));
        })
        .fields("signoff.requester.rejection.fields.v1", |fields| {
            outcome_fields(fields, request, names);
        })
        .build()
}

pub fn approver_completion(request: &ApprovalRequest, names: &Names) -> MessageTemplate {
    MessageBuilder::new(format!(
        "The request from {} has been fully approved",
        display(names, &request.requester_id)
    ))
    .section("signoff.approver.completion.v1", |section| {
        section.mrkdwn(format!(
            "The request from {} has been fully approved.",
            display(names, &request.requester_id),
        ));
    })
    .section("signoff.approver.completion.summary.v1", |section| {
        section.mrkdwn(summary_text(request));
    })
    .fields("signoff.approver.completion.fields.v1", |fields| {
        outcome_fields(fields, request, names);
    })
    .build()
}

pub fn approver_rejection(
    request: &ApprovalRequest,
    rejecter: &UserId,
    names: &Names,
) -> MessageTemplate {
    MessageBuilder::new(format!(
        "The request from {} was rejected",
        display(names, &request.requester_id)
    ))
    .section("signoff.approver.rejection.v1", |section| {
        section.mrkdwn(format!(
            "The request from {} was rejected by {}.",
            display(names, &request.requester_id),
            display(names, rejecter),
        ));
    })
    .section("signoff.approver.rejection.summary.v1", |section| {
        section.mrkdwn(summary_text(request));
    })
    .fields("signoff.approver.rejection.fields.v1", |fields| {
        outcome_fields(fields, request, names);
    })
    .build()
}

pub fn no_longer_active_notice() -> MessageTemplate {
    MessageBuilder::new(
        "This request is no longer active or has already been processed.".to_owned(),
    )
    .section("signoff.notice.inactive.v1", |section| {
        section.plain("This request is no longer active or has already been processed.");
    })
    .build()
}

/// Emoji-prefixed summary for the tenant's logging destination.
pub fn audit_summary(
    kind: AuditKind,
    request: &ApprovalRequest,
    actor: Option<&UserId>,
    names: &Names,
) -> MessageTemplate {
    let headline = kind.headline();
    let requester = display(names, &request.requester_id);
    let actor_line = actor.map(|id| display(names, id)).unwrap_or_else(|| "unknown".to_owned());

    let bullets = match kind {
        AuditKind::Created => format!(
            "• *Requester:* {requester}\n• *Approvers:* {}\n• *URL:* {}\n• *Details:* {}\n• *Request ID:* {}",
            roster_line(request, names),
            request.url,
            request.details,
            request.id
        ),
        AuditKind::PartialApproval => format!(
            "• *Requester:* {requester}\n• *Approved By:* {actor_line}\n• *Remaining Approvers:* {}\n• *URL:* {}\n• *Request ID:* {}",
            remaining_line(request, names),
            request.url,
            request.id
        ),
        AuditKind::FullApproval => format!(
            "• *Requester:* {requester}\n• *Status:* Approved\n• *URL:* {}\n• *Approvers:* {}\n• *Request ID:* {}",
            request.url,
            approved_line(request, names),
            request.id
        ),
        AuditKind::Rejected => format!(
            "• *Requester:* {requester}\n• *Rejected By:* {actor_line}\n• *URL:* {}\n• *Request ID:* {}",
            request.url,
            request.id
        ),
    };

    MessageBuilder::new(format!("{headline} ({})", request.id))
        .section("signoff.audit.summary.v1", |section| {
            section.mrkdwn(format!("{headline}\n{bullets}"));
        })
        .build()
}

/// Snapshot reply for `/signoff status <request-id>`.
pub fn status_reply(request: &ApprovalRequest, names: &Names) -> MessageTemplate {
    let status = status_line(request);

    MessageBuilder::new(format!("Request {} status: {status}", request.id))
        .section("signoff.status.header.v1", |section| {
            section.mrkdwn(format!("*Request:* `{}`", request.id));
        })
        .section("signoff.status.summary.v1", |section| {
            section.mrkdwn(summary_text(request));
        })
        .fields("signoff.status.fields.v1", |fields| {
            outcome_fields(fields, request, names);
        })
        .context("signoff.status.context.v1", |context| {
            context.plain(format!(
                "Submitted {}",
                request.created_at.format("%Y-%m-%d %H:%M UTC")
            ));
        })
        .build()
}

pub fn error_message(summary: &str, correlation_id: &str) -> MessageTemplate {
    MessageBuilder::new(summary.to_owned())
        .section("signoff.error.summary.v1", |section| {
            section.mrkdwn(format!(":warning: {summary}"));
        })
        .context("signoff.error.context.v1", |context| {
            context.plain(format!("Correlation ID: {correlation_id}"));
        })
        .build()
}

pub fn help_message() -> MessageTemplate {
    MessageBuilder::new("Signoff command help")
        .section("signoff.help.summary.v1", |section| {
            section.mrkdwn(
                "*Available commands*\n• `/signoff new`: open the approval request form\n• `/signoff status <request-id>`\n• `/signoff logchannel <#channel>`\n• `/signoff help`",
            );
        })
        .build()
}

pub mod audit;
pub mod config;
pub mod destinations;
pub mod domain;
pub mod errors;
pub mod fanout;
pub mod lifecycle;
pub mod store;

pub use audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use destinations::{DestinationError, DestinationStore};
pub use domain::{
    ApprovalRequest, ApprovalStatus, ChannelId, Decision, MessageRef, RequestDraft, RequestId,
    TeamId, UserId,
};
pub use errors::WorkflowError;
pub use fanout::{plan, ApproverNote, AuditKind, FanoutTrigger, Notification, RequesterNote};
pub use lifecycle::{
    apply_decision, decide, DecisionError, DecisionOutcome, LifecyclePolicy, Transition,
};
pub use store::{RequestStore, SubmitError};

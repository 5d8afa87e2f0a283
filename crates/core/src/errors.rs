use thiserror::Error;

use crate::destinations::DestinationError;
use crate::lifecycle::DecisionError;
use crate::store::SubmitError;

/// Everything the workflow surface can fail with, folded into one type so
/// interface code has a single place to turn a failure into words for the
/// acting human. None of these are fatal to the process.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Decision(#[from] DecisionError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error(transparent)]
    Destination(#[from] DestinationError),
    #[error("could not join channel `{channel}`: {reason}")]
    Join { channel: String, reason: String },
}

impl WorkflowError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Decision(DecisionError::NotFound(_)) => {
                "This approval request could not be found. It may predate the last restart."
            }
            Self::Decision(DecisionError::NotAnApprover { .. }) => {
                "You are not one of the approvers for this request."
            }
            Self::Submit(SubmitError::EmptyRoster) => "Select at least one approver.",
            Self::Submit(SubmitError::MissingUrl) => "Add the URL that needs approval.",
            Self::Submit(SubmitError::MissingDetails) => {
                "Add details describing what needs approval."
            }
            Self::Destination(_) => "The logging channel could not be saved. Please try again.",
            Self::Join { .. } => {
                "Could not join that channel. Check the channel name and bot permissions, then try again."
            }
        }
    }
}

//! Action Confirmation Gate.
//!
//! Every mutating action is first staged as a [`PendingAction`]. The gate
//! renders a [`ConfirmationPreview`] from it with [`describe`], which is pure
//! and may be called on every redraw. Batch counts are taken from the ids
//! captured when the action was staged, never re-read at confirm time.

use crate::verification::VerificationAction;
use serde::{Deserialize, Serialize};

/// An action awaiting operator confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PendingAction {
    Approve {
        beneficiary_id: String,
        beneficiary_name: String,
    },
    Reupload {
        beneficiary_id: String,
        beneficiary_name: String,
    },
    BatchApprove {
        beneficiary_ids: Vec<String>,
    },
    BatchReupload {
        beneficiary_ids: Vec<String>,
    },
}

impl PendingAction {
    pub fn verification_action(&self) -> VerificationAction {
        match self {
            PendingAction::Approve { .. } | PendingAction::BatchApprove { .. } => {
                VerificationAction::Approve
            }
            PendingAction::Reupload { .. } | PendingAction::BatchReupload { .. } => {
                VerificationAction::RequestReupload
            }
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(
            self,
            PendingAction::BatchApprove { .. } | PendingAction::BatchReupload { .. }
        )
    }

    /// Number of beneficiaries the action will touch
    pub fn affected_count(&self) -> usize {
        match self {
            PendingAction::Approve { .. } | PendingAction::Reupload { .. } => 1,
            PendingAction::BatchApprove { beneficiary_ids }
            | PendingAction::BatchReupload { beneficiary_ids } => beneficiary_ids.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Grants eligibility
    Success,
    /// Demotes eligibility and re-notifies the beneficiary
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationPreview {
    pub title: String,
    pub message: String,
    pub confirm_label: String,
    pub severity: Severity,
}

pub fn describe(action: &PendingAction) -> ConfirmationPreview {
    match action {
        PendingAction::Approve {
            beneficiary_name, ..
        } => ConfirmationPreview {
            title: "Confirm identity verification".to_string(),
            message: format!(
                "Verify the identity of beneficiary \"{}\"? Their status will change to \
                 \"verified\" and they become eligible to receive aid.",
                beneficiary_name
            ),
            confirm_label: "Verify identity".to_string(),
            severity: Severity::Success,
        },
        PendingAction::Reupload {
            beneficiary_name, ..
        } => ConfirmationPreview {
            title: "Request document re-upload".to_string(),
            message: format!(
                "Request new identity documents from beneficiary \"{}\"?\n\n\
                 This will:\n\
                 • notify the beneficiary by text message\n\
                 • set the verification status to \"pending\" until new documents arrive\n\
                 • send clear instructions about the documents required",
                beneficiary_name
            ),
            confirm_label: "Send re-upload request".to_string(),
            severity: Severity::Warning,
        },
        PendingAction::BatchApprove { beneficiary_ids } => {
            let count = beneficiary_ids.len();
            ConfirmationPreview {
                title: "Confirm batch verification".to_string(),
                message: format!(
                    "Verify the identity of {} beneficiaries? All of them will change to \
                     \"verified\".",
                    count
                ),
                confirm_label: format!("Verify {} beneficiaries", count),
                severity: Severity::Success,
            }
        }
        PendingAction::BatchReupload { beneficiary_ids } => {
            let count = beneficiary_ids.len();
            ConfirmationPreview {
                title: "Request document re-upload (batch)".to_string(),
                message: format!(
                    "Request new identity documents from {} beneficiaries?\n\n\
                     This will:\n\
                     • send notifications by text message to each of them\n\
                     • set the verification status of every selected beneficiary to \"pending\"\n\
                     • send clear instructions to each beneficiary",
                    count
                ),
                confirm_label: format!("Send re-upload request to {} beneficiaries", count),
                severity: Severity::Warning,
            }
        }
    }
}

// Verification State Machine - the only writer of `identity_status`
//
//   pending ──approve──────────▶ verified
//   rejected ─approve──────────▶ verified
//   verified ─request_reupload─▶ pending
//   rejected ─request_reupload─▶ pending
//
// Both transitions are accepted from any state. Re-applying one lands in the
// same state but still refreshes `updated_at` and emits a fresh audit entry,
// so a repeated reupload request re-notifies the beneficiary.

use crate::audit::{AuditEntry, AuditSink};
use crate::entities::{Beneficiary, IdentityStatus};
use crate::store::{RecordStore, StoreError, StoreResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Source tag attached to every audit entry from this workflow
pub const AUDIT_SOURCE: &str = "identity-verification";

/// Errors surfaced to callers of the verification workflow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    /// Single-record failure from the record store.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A batch was requested with no beneficiaries.
    #[error("batch action requires at least one beneficiary")]
    EmptyBatch,

    /// A batch is still settling; re-submission is refused.
    #[error("a batch action is already in progress")]
    BatchInFlight,

    /// The action being confirmed is not the one currently staged.
    #[error("the pending action changed since it was previewed")]
    PendingActionChanged,
}

// ============================================================================
// ACTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationAction {
    Approve,
    RequestReupload,
}

impl VerificationAction {
    pub fn target_status(&self) -> IdentityStatus {
        match self {
            VerificationAction::Approve => IdentityStatus::Verified,
            // Reupload reuses the pending queue; there is no separate state
            VerificationAction::RequestReupload => IdentityStatus::Pending,
        }
    }

    /// Whether offering this action from `current` changes anything visible.
    /// The transition itself is legal from every state.
    pub fn is_meaningful_from(&self, current: IdentityStatus) -> bool {
        current != self.target_status()
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            VerificationAction::Approve => "identity_verified",
            VerificationAction::RequestReupload => "reupload_requested",
        }
    }

    pub fn batch_event_type(&self) -> &'static str {
        match self {
            VerificationAction::Approve => "batch_identity_verified",
            VerificationAction::RequestReupload => "batch_reupload_requested",
        }
    }

    pub fn audit_message(&self, beneficiary_name: &str) -> String {
        match self {
            VerificationAction::Approve => {
                format!("identity verified for beneficiary {}", beneficiary_name)
            }
            VerificationAction::RequestReupload => format!(
                "document re-upload requested from beneficiary {}; \
                 a notification will be sent asking for new documents",
                beneficiary_name
            ),
        }
    }

    pub fn batch_audit_message(&self, succeeded: usize) -> String {
        match self {
            VerificationAction::Approve => {
                format!("identity verified for {} beneficiaries in batch", succeeded)
            }
            VerificationAction::RequestReupload => format!(
                "document re-upload requested from {} beneficiaries in batch; \
                 notifications will be sent asking for new documents",
                succeeded
            ),
        }
    }
}

// ============================================================================
// TRANSITIONS
// ============================================================================

/// Commit the action's target status with a fresh `updated_at`.
///
/// This is the state-machine write shared by the single and batch paths.
/// It does not emit audit entries.
pub async fn commit(
    store: &dyn RecordStore,
    action: VerificationAction,
    beneficiary_id: &str,
) -> StoreResult<Beneficiary> {
    store
        .update_identity_status(beneficiary_id, action.target_status(), Utc::now())
        .await
}

/// Apply one action to one beneficiary; failures propagate to the caller.
pub async fn apply(
    store: &dyn RecordStore,
    sink: &dyn AuditSink,
    action: VerificationAction,
    beneficiary_id: &str,
    beneficiary_name: &str,
) -> Result<Beneficiary, VerificationError> {
    match commit(store, action, beneficiary_id).await {
        Ok(updated) => {
            info!(
                id = beneficiary_id,
                status = %updated.identity_status,
                "identity status updated"
            );
            sink.record(
                &AuditEntry::new(
                    action.event_type(),
                    action.audit_message(beneficiary_name),
                    AUDIT_SOURCE,
                )
                .for_entity(beneficiary_id),
            );
            Ok(updated)
        }
        Err(e) => {
            warn!(id = beneficiary_id, error = %e, "identity status update failed");
            sink.record(
                &AuditEntry::new(
                    "verification_failed",
                    format!(
                        "failed to update identity status for beneficiary {}: {}",
                        beneficiary_name, e
                    ),
                    AUDIT_SOURCE,
                )
                .for_entity(beneficiary_id),
            );
            Err(e.into())
        }
    }
}

pub async fn approve(
    store: &dyn RecordStore,
    sink: &dyn AuditSink,
    beneficiary_id: &str,
    beneficiary_name: &str,
) -> Result<Beneficiary, VerificationError> {
    apply(store, sink, VerificationAction::Approve, beneficiary_id, beneficiary_name).await
}

pub async fn request_reupload(
    store: &dyn RecordStore,
    sink: &dyn AuditSink,
    beneficiary_id: &str,
    beneficiary_name: &str,
) -> Result<Beneficiary, VerificationError> {
    apply(
        store,
        sink,
        VerificationAction::RequestReupload,
        beneficiary_id,
        beneficiary_name,
    )
    .await
}

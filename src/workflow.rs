//! Verification Controller.
//!
//! Owns the process-local state of the verification screen: the Selection
//! Set, the Pending Action, and a read cache of the beneficiary list.
//!
//! Lifecycle rules:
//! - Selection and pending action start empty and change only through the
//!   methods below.
//! - [`VerificationController::cancel`] discards the pending action and
//!   touches nothing else.
//! - A confirmed batch clears the selection once every record has settled;
//!   single-record actions never touch it.
//! - After any mutation the list is refetched from the store, never patched.

use crate::audit::AuditSink;
use crate::batch::{BatchCoordinator, BatchReport, CoordinatorState};
use crate::confirmation::{describe, ConfirmationPreview, PendingAction};
use crate::entities::Beneficiary;
use crate::filter::{BeneficiaryFilter, Page, Sort, Statistics};
use crate::selection::SelectionSet;
use crate::store::RecordStore;
use crate::verification::{self, VerificationError};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// What a confirmation actually did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConfirmOutcome {
    /// Nothing was staged; confirming was a no-op.
    NothingPending,
    Single { beneficiary: Beneficiary },
    Batch { report: BatchReport },
}

pub struct VerificationController {
    store: Arc<dyn RecordStore>,
    sink: Arc<dyn AuditSink>,
    coordinator: BatchCoordinator,

    selection: SelectionSet,
    pending: Option<PendingAction>,

    filter: BeneficiaryFilter,
    sort: Sort,
    page: Page,
    beneficiaries: Vec<Beneficiary>,
}

impl VerificationController {
    pub fn new(store: Arc<dyn RecordStore>, sink: Arc<dyn AuditSink>) -> Self {
        VerificationController {
            store,
            sink,
            coordinator: BatchCoordinator::new(),
            selection: SelectionSet::new(),
            pending: None,
            filter: BeneficiaryFilter::default(),
            sort: Sort::default(),
            page: Page::default(),
            beneficiaries: Vec::new(),
        }
    }

    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page = Page::new(1, size);
        self
    }

    pub fn store(&self) -> Arc<dyn RecordStore> {
        self.store.clone()
    }

    // ========================================================================
    // READ CACHE
    // ========================================================================

    /// Refetch the list for the active filter from the store.
    pub async fn refresh(&mut self) -> Result<(), VerificationError> {
        let mut items = self.store.list(&self.filter).await?;
        self.sort.apply(&mut items);
        self.beneficiaries = items;

        let total = self.total_pages();
        if self.page.number > total {
            self.page.number = total.max(1);
        }

        debug!(count = self.beneficiaries.len(), "beneficiary list refreshed");
        Ok(())
    }

    async fn refresh_after_mutation(&mut self) {
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "refetch after mutation failed; list may be stale");
        }
    }

    pub fn beneficiaries(&self) -> &[Beneficiary] {
        &self.beneficiaries
    }

    pub fn find(&self, id: &str) -> Option<&Beneficiary> {
        self.beneficiaries.iter().find(|b| b.id == id)
    }

    pub fn statistics(&self) -> Statistics {
        Statistics::from_beneficiaries(&self.beneficiaries)
    }

    pub fn filter(&self) -> &BeneficiaryFilter {
        &self.filter
    }

    /// Changing the filter returns to the first page.
    pub async fn set_filter(&mut self, filter: BeneficiaryFilter) -> Result<(), VerificationError> {
        self.filter = filter;
        self.page.number = 1;
        self.refresh().await
    }

    pub fn sort(&self) -> Sort {
        self.sort
    }

    pub fn set_sort(&mut self, sort: Sort) {
        self.sort = sort;
        self.sort.apply(&mut self.beneficiaries);
    }

    pub fn page(&self) -> Page {
        self.page
    }

    pub fn total_pages(&self) -> usize {
        self.page.total_pages(self.beneficiaries.len())
    }

    pub fn set_page(&mut self, number: usize) {
        self.page.number = number.clamp(1, self.total_pages().max(1));
    }

    pub fn current_page(&self) -> &[Beneficiary] {
        self.page.slice(&self.beneficiaries)
    }

    pub fn current_page_ids(&self) -> Vec<String> {
        self.current_page().iter().map(|b| b.id.clone()).collect()
    }

    // ========================================================================
    // SELECTION
    // ========================================================================

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn toggle_selection(&mut self, id: &str) -> bool {
        self.selection.toggle(id)
    }

    pub fn select_all<I, S>(&mut self, page_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selection.select_all(page_ids);
    }

    pub fn select_current_page(&mut self) {
        let ids = self.current_page_ids();
        self.selection.select_all(ids);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Leaving the screen drops both pieces of ephemeral state.
    pub fn reset_view(&mut self) {
        self.selection.clear();
        self.pending = None;
    }

    // ========================================================================
    // STAGING (Confirmation Gate input)
    // ========================================================================

    /// Stage an action for confirmation, replacing any previous one.
    /// Batch ids are de-duplicated; an empty batch is refused.
    pub fn stage(&mut self, action: PendingAction) -> Result<&PendingAction, VerificationError> {
        let action = match action {
            PendingAction::BatchApprove { beneficiary_ids } => PendingAction::BatchApprove {
                beneficiary_ids: distinct(beneficiary_ids)?,
            },
            PendingAction::BatchReupload { beneficiary_ids } => PendingAction::BatchReupload {
                beneficiary_ids: distinct(beneficiary_ids)?,
            },
            single => single,
        };

        debug!(?action, "action staged");
        Ok(self.pending.insert(action))
    }

    pub fn approve(&mut self, id: &str, display_name: &str) -> &PendingAction {
        self.pending.insert(PendingAction::Approve {
            beneficiary_id: id.to_string(),
            beneficiary_name: display_name.to_string(),
        })
    }

    pub fn request_reupload(&mut self, id: &str, display_name: &str) -> &PendingAction {
        self.pending.insert(PendingAction::Reupload {
            beneficiary_id: id.to_string(),
            beneficiary_name: display_name.to_string(),
        })
    }

    pub fn batch_approve<I>(&mut self, ids: I) -> Result<&PendingAction, VerificationError>
    where
        I: IntoIterator<Item = String>,
    {
        self.stage(PendingAction::BatchApprove {
            beneficiary_ids: ids.into_iter().collect(),
        })
    }

    pub fn batch_request_reupload<I>(&mut self, ids: I) -> Result<&PendingAction, VerificationError>
    where
        I: IntoIterator<Item = String>,
    {
        self.stage(PendingAction::BatchReupload {
            beneficiary_ids: ids.into_iter().collect(),
        })
    }

    /// Stage a batch approval of the current selection
    pub fn batch_approve_selected(&mut self) -> Result<&PendingAction, VerificationError> {
        let ids = self.selection.to_vec();
        self.batch_approve(ids)
    }

    /// Stage a batch reupload request for the current selection
    pub fn batch_request_reupload_selected(&mut self) -> Result<&PendingAction, VerificationError> {
        let ids = self.selection.to_vec();
        self.batch_request_reupload(ids)
    }

    pub fn pending_action(&self) -> Option<&PendingAction> {
        self.pending.as_ref()
    }

    pub fn preview(&self) -> Option<ConfirmationPreview> {
        self.pending.as_ref().map(describe)
    }

    /// Close the dialog without confirming. Nothing else changes.
    pub fn cancel(&mut self) -> Option<PendingAction> {
        self.pending.take()
    }

    // ========================================================================
    // EXECUTION
    // ========================================================================

    pub fn coordinator_state(&self) -> CoordinatorState {
        self.coordinator.state()
    }

    /// True while a batch is settling; batch triggers should be disabled.
    pub fn is_busy(&self) -> bool {
        self.coordinator.is_running()
    }

    /// Execute the pending action. The only path that mutates records.
    ///
    /// A single-record failure is returned as an error. A batch always
    /// reports per-record outcomes in its `BatchReport` instead.
    pub async fn confirm(&mut self) -> Result<ConfirmOutcome, VerificationError> {
        if self.coordinator.is_running() {
            return Err(VerificationError::BatchInFlight);
        }

        let Some(action) = self.pending.take() else {
            debug!("confirm called with nothing pending");
            return Ok(ConfirmOutcome::NothingPending);
        };
        let verification_action = action.verification_action();

        match action {
            PendingAction::Approve {
                beneficiary_id,
                beneficiary_name,
            }
            | PendingAction::Reupload {
                beneficiary_id,
                beneficiary_name,
            } => {
                let result = verification::apply(
                    self.store.as_ref(),
                    self.sink.as_ref(),
                    verification_action,
                    &beneficiary_id,
                    &beneficiary_name,
                )
                .await;

                self.refresh_after_mutation().await;
                result.map(|beneficiary| ConfirmOutcome::Single { beneficiary })
            }
            PendingAction::BatchApprove { beneficiary_ids }
            | PendingAction::BatchReupload { beneficiary_ids } => {
                let report = self
                    .coordinator
                    .run(
                        self.store.as_ref(),
                        self.sink.as_ref(),
                        verification_action,
                        &beneficiary_ids,
                    )
                    .await?;

                self.selection.clear();
                self.refresh_after_mutation().await;
                Ok(ConfirmOutcome::Batch { report })
            }
        }
    }

    /// Confirm only if `expected` is still the staged action.
    ///
    /// For callers that cannot hold the dialog open themselves: they echo back
    /// the action they previewed. On mismatch nothing runs and the staged
    /// action is kept.
    pub async fn confirm_previewed(
        &mut self,
        expected: &PendingAction,
    ) -> Result<ConfirmOutcome, VerificationError> {
        if self.pending.as_ref() != Some(expected) {
            return Err(VerificationError::PendingActionChanged);
        }
        self.confirm().await
    }
}

fn distinct(ids: Vec<String>) -> Result<Vec<String>, VerificationError> {
    let mut seen = HashSet::new();
    let ids: Vec<String> = ids.into_iter().filter(|id| seen.insert(id.clone())).collect();
    if ids.is_empty() {
        return Err(VerificationError::EmptyBatch);
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemorySink;
    use crate::entities::IdentityStatus;
    use crate::store::MemoryStore;

    fn controller_with(ids: &[&str]) -> (VerificationController, MemorySink) {
        let store = MemoryStore::with_records(ids.iter().enumerate().map(|(i, id)| {
            let mut b = Beneficiary::new(&format!("Person {}", i), &format!("9000{}", i), "0599");
            b.id = id.to_string();
            b
        }));
        let sink = MemorySink::new();
        let controller = VerificationController::new(Arc::new(store), Arc::new(sink.clone()));
        (controller, sink)
    }

    #[tokio::test]
    async fn test_confirm_without_pending_is_noop() {
        let (mut controller, sink) = controller_with(&["B-1"]);

        let outcome = controller.confirm().await.unwrap();

        assert_eq!(outcome, ConfirmOutcome::NothingPending);
        assert!(sink.entries().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_leaves_everything_untouched() {
        let (mut controller, sink) = controller_with(&["B-1", "B-2"]);
        controller.refresh().await.unwrap();
        controller.toggle_selection("B-1");
        controller.toggle_selection("B-2");
        controller.batch_approve_selected().unwrap();

        let discarded = controller.cancel();

        assert!(matches!(discarded, Some(PendingAction::BatchApprove { .. })));
        assert!(controller.pending_action().is_none());
        assert_eq!(controller.selection().len(), 2);
        assert!(sink.entries().is_empty());
        assert!(controller
            .beneficiaries()
            .iter()
            .all(|b| b.identity_status == IdentityStatus::Pending));
    }

    #[tokio::test]
    async fn test_single_approve_refetches_and_keeps_selection() {
        let (mut controller, _sink) = controller_with(&["B-1", "B-2"]);
        controller.refresh().await.unwrap();
        controller.toggle_selection("B-2");

        controller.approve("B-1", "Person 0");
        let preview = controller.preview().unwrap();
        assert!(preview.message.contains("Person 0"));

        let outcome = controller.confirm().await.unwrap();
        assert!(matches!(outcome, ConfirmOutcome::Single { .. }));

        assert_eq!(
            controller.find("B-1").unwrap().identity_status,
            IdentityStatus::Verified
        );
        assert!(controller.selection().contains("B-2"));
        assert!(controller.pending_action().is_none());
    }

    #[tokio::test]
    async fn test_single_failure_propagates_and_clears_pending() {
        let (mut controller, _sink) = controller_with(&["B-1"]);
        controller.request_reupload("B-404", "Ghost");

        let result = controller.confirm().await;

        assert!(matches!(result, Err(VerificationError::Store(_))));
        assert!(controller.pending_action().is_none());
    }

    #[tokio::test]
    async fn test_batch_clears_selection() {
        let (mut controller, sink) = controller_with(&["B-1", "B-2", "B-3"]);
        controller.refresh().await.unwrap();
        controller.select_current_page();
        assert_eq!(controller.selection().len(), 3);

        controller.batch_request_reupload_selected().unwrap();
        let outcome = controller.confirm().await.unwrap();

        match outcome {
            ConfirmOutcome::Batch { report } => assert_eq!(report.succeeded_count(), 3),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(controller.selection().is_empty());
        assert_eq!(sink.entries_of_type("batch_reupload_requested").len(), 1);
    }

    #[tokio::test]
    async fn test_confirm_previewed_refuses_a_replaced_action() {
        let (mut controller, sink) = controller_with(&["B-1", "B-2"]);
        controller.refresh().await.unwrap();

        let previewed = controller.approve("B-1", "Person 0").clone();
        controller
            .batch_request_reupload(vec!["B-1".to_string(), "B-2".to_string()])
            .unwrap();

        let result = controller.confirm_previewed(&previewed).await;

        assert_eq!(result, Err(VerificationError::PendingActionChanged));
        assert!(matches!(
            controller.pending_action(),
            Some(PendingAction::BatchReupload { .. })
        ));
        assert!(sink.entries().is_empty());

        let staged = controller.pending_action().unwrap().clone();
        let outcome = controller.confirm_previewed(&staged).await.unwrap();
        assert!(matches!(outcome, ConfirmOutcome::Batch { .. }));
    }

    #[test]
    fn test_empty_batch_cannot_be_staged() {
        let (mut controller, _sink) = controller_with(&[]);

        let result = controller.batch_approve_selected();

        assert_eq!(result.err(), Some(VerificationError::EmptyBatch));
        assert!(controller.pending_action().is_none());
    }

    #[test]
    fn test_batch_ids_are_deduplicated_at_staging() {
        let (mut controller, _sink) = controller_with(&[]);

        let staged = controller
            .batch_approve(vec!["B-1".to_string(), "B-1".to_string(), "B-2".to_string()])
            .unwrap();

        assert_eq!(staged.affected_count(), 2);
    }

    #[tokio::test]
    async fn test_reset_view_drops_selection_and_pending() {
        let (mut controller, _sink) = controller_with(&["B-1"]);
        controller.toggle_selection("B-1");
        controller.approve("B-1", "Person 0");

        controller.reset_view();

        assert!(controller.selection().is_empty());
        assert!(controller.pending_action().is_none());
    }

    #[tokio::test]
    async fn test_filter_change_returns_to_first_page() {
        let ids: Vec<String> = (0..5).map(|i| format!("B-{}", i)).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let (controller, _sink) = controller_with(&refs);
        let mut controller = controller.with_page_size(2);
        controller.refresh().await.unwrap();

        assert_eq!(controller.total_pages(), 3);
        controller.set_page(3);
        assert_eq!(controller.current_page().len(), 1);

        controller
            .set_filter(BeneficiaryFilter::new().with_identity_status(IdentityStatus::Pending))
            .await
            .unwrap();
        assert_eq!(controller.page().number, 1);
        assert_eq!(controller.current_page().len(), 2);
    }
}

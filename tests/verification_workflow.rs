// End-to-end scenarios for the identity verification workflow

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relief_desk::{
    Beneficiary, BeneficiaryFilter, ConfirmOutcome, IdentityStatus, MemorySink, MemoryStore,
    PendingAction, RecordStore, SqliteAuditSink, SqliteStore, StoreError, StoreResult,
    VerificationController, VerificationError,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Wraps a `MemoryStore` and fails status updates for chosen ids
struct FlakyStore {
    inner: MemoryStore,
    failing: HashSet<String>,
    writes: AtomicUsize,
}

impl FlakyStore {
    fn new(inner: MemoryStore, failing: &[&str]) -> Self {
        FlakyStore {
            inner,
            failing: failing.iter().map(|s| s.to_string()).collect(),
            writes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn get(&self, id: &str) -> StoreResult<Beneficiary> {
        self.inner.get(id).await
    }

    async fn update_identity_status(
        &self,
        id: &str,
        status: IdentityStatus,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Beneficiary> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(id) {
            return Err(StoreError::Backend(format!("connection reset while updating {}", id)));
        }
        self.inner.update_identity_status(id, status, updated_at).await
    }

    async fn list(&self, filter: &BeneficiaryFilter) -> StoreResult<Vec<Beneficiary>> {
        self.inner.list(filter).await
    }

    async fn insert(&self, beneficiary: &Beneficiary) -> StoreResult<()> {
        self.inner.insert(beneficiary).await
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.inner.delete(id).await
    }

    async fn count(&self) -> StoreResult<usize> {
        self.inner.count().await
    }
}

fn beneficiary(id: &str, name: &str, status: IdentityStatus) -> Beneficiary {
    let mut b = Beneficiary::new(name, &format!("ID-{}", id), "0599000000");
    b.id = id.to_string();
    b.identity_status = status;
    b
}

struct Harness {
    controller: VerificationController,
    store: Arc<FlakyStore>,
    sink: MemorySink,
}

async fn harness(records: Vec<Beneficiary>, failing: &[&str]) -> Harness {
    let store = Arc::new(FlakyStore::new(MemoryStore::with_records(records), failing));
    let sink = MemorySink::new();
    let mut controller = VerificationController::new(store.clone(), Arc::new(sink.clone()));
    controller.refresh().await.unwrap();
    Harness {
        controller,
        store,
        sink,
    }
}

fn status_of(controller: &VerificationController, id: &str) -> IdentityStatus {
    controller.find(id).unwrap().identity_status
}

#[tokio::test]
async fn approve_then_refetch_is_verified_from_every_state() {
    let mut h = harness(
        vec![
            beneficiary("B-1", "Amal", IdentityStatus::Pending),
            beneficiary("B-2", "Omar", IdentityStatus::Rejected),
            beneficiary("B-3", "Layla", IdentityStatus::Verified),
        ],
        &[],
    )
    .await;

    for id in ["B-1", "B-2", "B-3"] {
        h.controller.approve(id, id);
        h.controller.confirm().await.unwrap();
        assert_eq!(status_of(&h.controller, id), IdentityStatus::Verified);
    }
}

#[tokio::test]
async fn reupload_then_refetch_is_pending_from_every_state() {
    let mut h = harness(
        vec![
            beneficiary("B-1", "Amal", IdentityStatus::Pending),
            beneficiary("B-2", "Omar", IdentityStatus::Rejected),
            beneficiary("B-3", "Layla", IdentityStatus::Verified),
        ],
        &[],
    )
    .await;

    for id in ["B-1", "B-2", "B-3"] {
        h.controller.request_reupload(id, id);
        h.controller.confirm().await.unwrap();
        assert_eq!(status_of(&h.controller, id), IdentityStatus::Pending);
    }
    assert_eq!(h.sink.entries_of_type("reupload_requested").len(), 3);
}

#[tokio::test]
async fn approving_twice_matches_approving_once() {
    let mut h = harness(vec![beneficiary("B-1", "Amal", IdentityStatus::Pending)], &[]).await;

    h.controller.approve("B-1", "Amal");
    h.controller.confirm().await.unwrap();
    let once = h.controller.find("B-1").unwrap().clone();

    h.controller.approve("B-1", "Amal");
    h.controller.confirm().await.unwrap();
    let twice = h.controller.find("B-1").unwrap().clone();

    assert_eq!(once.identity_status, twice.identity_status);
    assert!(twice.updated_at >= once.updated_at);
    // Each application is audited
    assert_eq!(h.sink.entries_of_type("identity_verified").len(), 2);
}

#[tokio::test]
async fn batch_with_one_failure_settles_the_rest() {
    let mut h = harness(
        vec![
            beneficiary("B-1", "Amal", IdentityStatus::Pending),
            beneficiary("B-2", "Omar", IdentityStatus::Pending),
            beneficiary("B-3", "Layla", IdentityStatus::Rejected),
        ],
        &["B-2"],
    )
    .await;

    for id in ["B-1", "B-2", "B-3"] {
        h.controller.toggle_selection(id);
    }
    h.controller.batch_approve_selected().unwrap();

    let preview = h.controller.preview().unwrap();
    assert!(preview.confirm_label.contains('3'));

    let outcome = h.controller.confirm().await.unwrap();
    let ConfirmOutcome::Batch { report } = outcome else {
        panic!("expected a batch outcome");
    };

    assert_eq!(report.succeeded_count(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].beneficiary_id, "B-2");

    assert_eq!(status_of(&h.controller, "B-1"), IdentityStatus::Verified);
    assert_eq!(status_of(&h.controller, "B-2"), IdentityStatus::Pending);
    assert_eq!(status_of(&h.controller, "B-3"), IdentityStatus::Verified);

    let summaries = h.sink.entries_of_type("batch_identity_verified");
    assert_eq!(summaries.len(), 1);
    assert!(summaries[0].message.contains(" 2 "));
    // Summary comes after every per-record entry
    let last = h.sink.entries().pop().unwrap();
    assert_eq!(last.event_type, "batch_identity_verified");

    assert!(h.controller.selection().is_empty());
    assert!(!h.controller.is_busy());
}

#[tokio::test]
async fn batch_where_every_record_fails_still_reports_and_clears() {
    let mut h = harness(
        vec![
            beneficiary("B-1", "Amal", IdentityStatus::Pending),
            beneficiary("B-2", "Omar", IdentityStatus::Pending),
        ],
        &["B-1", "B-2"],
    )
    .await;

    h.controller.select_current_page();
    h.controller.batch_request_reupload_selected().unwrap();
    let outcome = h.controller.confirm().await.unwrap();

    let ConfirmOutcome::Batch { report } = outcome else {
        panic!("expected a batch outcome");
    };
    assert_eq!(report.succeeded_count(), 0);
    assert_eq!(report.failed_count(), 2);

    let summaries = h.sink.entries_of_type("batch_reupload_requested");
    assert_eq!(summaries.len(), 1);
    assert!(summaries[0].message.contains(" 0 "));
    assert!(h.controller.selection().is_empty());
}

#[tokio::test]
async fn cancel_has_no_side_effects() {
    let mut h = harness(
        vec![
            beneficiary("B-1", "Amal", IdentityStatus::Pending),
            beneficiary("B-2", "Omar", IdentityStatus::Rejected),
        ],
        &[],
    )
    .await;

    h.controller.toggle_selection("B-1");
    h.controller.toggle_selection("B-2");

    h.controller.batch_approve_selected().unwrap();
    h.controller.cancel();
    h.controller.request_reupload("B-1", "Amal");
    h.controller.cancel();

    assert_eq!(h.store.writes.load(Ordering::SeqCst), 0);
    assert!(h.sink.entries().is_empty());
    assert_eq!(h.controller.selection().len(), 2);
    assert_eq!(status_of(&h.controller, "B-1"), IdentityStatus::Pending);
    assert_eq!(status_of(&h.controller, "B-2"), IdentityStatus::Rejected);
}

#[tokio::test]
async fn clear_selection_always_empties() {
    let mut h = harness(vec![], &[]).await;

    h.controller.clear_selection();
    assert!(h.controller.selection().is_empty());

    for id in ["a", "b", "c"] {
        h.controller.toggle_selection(id);
    }
    h.controller.clear_selection();
    assert!(h.controller.selection().is_empty());
}

#[tokio::test]
async fn rejected_beneficiary_reupload_names_them_in_the_audit_log() {
    let mut h = harness(
        vec![beneficiary("B-100", "Jane Doe", IdentityStatus::Rejected)],
        &[],
    )
    .await;

    h.controller.request_reupload("B-100", "Jane Doe");
    let outcome = h.controller.confirm().await.unwrap();

    let ConfirmOutcome::Single { beneficiary } = outcome else {
        panic!("expected a single outcome");
    };
    assert_eq!(beneficiary.identity_status, IdentityStatus::Pending);
    assert_eq!(status_of(&h.controller, "B-100"), IdentityStatus::Pending);
    assert!(h.sink.messages().iter().any(|m| m.contains("Jane Doe")));
}

#[tokio::test]
async fn single_failure_propagates_and_leaves_selection() {
    let mut h = harness(
        vec![
            beneficiary("B-1", "Amal", IdentityStatus::Pending),
            beneficiary("B-2", "Omar", IdentityStatus::Pending),
        ],
        &["B-1"],
    )
    .await;
    h.controller.toggle_selection("B-2");

    h.controller.approve("B-1", "Amal");
    let result = h.controller.confirm().await;

    assert!(matches!(
        result,
        Err(VerificationError::Store(StoreError::Backend(_)))
    ));
    assert!(h.controller.selection().contains("B-2"));
    assert_eq!(status_of(&h.controller, "B-1"), IdentityStatus::Pending);
    assert_eq!(h.sink.entries_of_type("verification_failed").len(), 1);
}

#[tokio::test]
async fn confirm_without_pending_action_is_a_no_op() {
    let mut h = harness(vec![beneficiary("B-1", "Amal", IdentityStatus::Pending)], &[]).await;

    assert_eq!(h.controller.confirm().await.unwrap(), ConfirmOutcome::NothingPending);
    assert_eq!(h.store.writes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn staged_batch_count_is_captured_at_staging() {
    let mut h = harness(
        vec![
            beneficiary("B-1", "Amal", IdentityStatus::Pending),
            beneficiary("B-2", "Omar", IdentityStatus::Pending),
        ],
        &[],
    )
    .await;

    h.controller.toggle_selection("B-1");
    h.controller.toggle_selection("B-2");
    h.controller.batch_approve_selected().unwrap();

    // Changing the selection after staging does not change the staged batch
    h.controller.clear_selection();
    assert_eq!(h.controller.pending_action().unwrap().affected_count(), 2);

    let ConfirmOutcome::Batch { report } = h.controller.confirm().await.unwrap() else {
        panic!("expected a batch outcome");
    };
    assert_eq!(report.succeeded_count(), 2);
}

#[tokio::test]
async fn workflow_over_sqlite_persists_audit_history() {
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .insert(&beneficiary("B-100", "Jane Doe", IdentityStatus::Rejected))
        .await
        .unwrap();
    let audit = SqliteAuditSink::new(store.connection(), "tester");

    let mut controller = VerificationController::new(Arc::new(store.clone()), Arc::new(audit.clone()));
    controller
        .stage(PendingAction::Reupload {
            beneficiary_id: "B-100".to_string(),
            beneficiary_name: "Jane Doe".to_string(),
        })
        .unwrap();
    controller.confirm().await.unwrap();

    assert_eq!(
        store.get("B-100").await.unwrap().identity_status,
        IdentityStatus::Pending
    );
    let events = audit.events_for("B-100").unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "reupload_requested");
    assert_eq!(events[0].actor, "tester");
    assert!(events[0].data["message"].as_str().unwrap().contains("Jane Doe"));
}

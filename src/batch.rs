//! Batch Coordinator.
//!
//! Applies one [`VerificationAction`] to many beneficiaries. Every per-record
//! update is issued at once and awaited together; a failing record never
//! stops its siblings. Only after every record has settled does the
//! coordinator emit its single summary audit entry.

use crate::audit::{AuditEntry, AuditSink};
use crate::store::{RecordStore, StoreError};
use crate::verification::{self, VerificationAction, VerificationError, AUDIT_SOURCE};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    Idle,
    Running,
}

/// Per-record outcome of one batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub action: VerificationAction,
    pub requested: usize,
    pub succeeded: Vec<String>,
    pub failed: Vec<BatchFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub beneficiary_id: String,
    pub error: String,
}

impl BatchReport {
    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs batches; clones share the same `Idle`/`Running` state.
#[derive(Debug, Clone, Default)]
pub struct BatchCoordinator {
    running: Arc<AtomicBool>,
}

/// Returns the coordinator to `Idle` however the run ends.
struct RunGuard {
    running: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

impl BatchCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CoordinatorState {
        if self.is_running() {
            CoordinatorState::Running
        } else {
            CoordinatorState::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn begin(&self) -> Result<RunGuard, VerificationError> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| VerificationError::BatchInFlight)?;
        Ok(RunGuard {
            running: self.running.clone(),
        })
    }

    /// Apply `action` to every id. Individual failures are reported in the
    /// returned `BatchReport`; only orchestration problems are errors.
    pub async fn run(
        &self,
        store: &dyn RecordStore,
        sink: &dyn AuditSink,
        action: VerificationAction,
        beneficiary_ids: &[String],
    ) -> Result<BatchReport, VerificationError> {
        if beneficiary_ids.is_empty() {
            return Err(VerificationError::EmptyBatch);
        }
        let _guard = self.begin()?;

        info!(
            action = ?action,
            count = beneficiary_ids.len(),
            "batch started"
        );

        let outcomes: Vec<(&String, Result<_, StoreError>)> =
            join_all(beneficiary_ids.iter().map(|id| async move {
                (id, verification::commit(store, action, id).await)
            }))
            .await;

        let mut report = BatchReport {
            action,
            requested: beneficiary_ids.len(),
            succeeded: Vec::new(),
            failed: Vec::new(),
        };

        for (id, outcome) in outcomes {
            match outcome {
                Ok(_) => report.succeeded.push(id.clone()),
                Err(e) => {
                    warn!(id = %id, error = %e, "batch record failed");
                    sink.record(
                        &AuditEntry::new(
                            "batch_record_failed",
                            format!("batch update failed for beneficiary {}: {}", id, e),
                            AUDIT_SOURCE,
                        )
                        .for_entity(id),
                    );
                    report.failed.push(BatchFailure {
                        beneficiary_id: id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        // Every record has settled; exactly one summary entry
        sink.record(&AuditEntry::new(
            action.batch_event_type(),
            action.batch_audit_message(report.succeeded_count()),
            AUDIT_SOURCE,
        ));

        info!(
            action = ?action,
            succeeded = report.succeeded_count(),
            failed = report.failed_count(),
            "batch settled"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemorySink;
    use crate::entities::{Beneficiary, IdentityStatus};
    use crate::filter::BeneficiaryFilter;
    use crate::store::{MemoryStore, StoreResult};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn store_with(list: &[&str]) -> MemoryStore {
        MemoryStore::with_records(list.iter().enumerate().map(|(i, id)| {
            let mut b = Beneficiary::new("Person", &format!("90000000{}", i), "0599");
            b.id = id.to_string();
            b
        }))
    }

    /// Observes the coordinator state from inside a store call
    struct ObservingStore {
        inner: MemoryStore,
        coordinator: BatchCoordinator,
        seen: std::sync::Mutex<Vec<CoordinatorState>>,
    }

    #[async_trait]
    impl RecordStore for ObservingStore {
        async fn get(&self, id: &str) -> StoreResult<Beneficiary> {
            self.inner.get(id).await
        }

        async fn update_identity_status(
            &self,
            id: &str,
            status: IdentityStatus,
            updated_at: DateTime<Utc>,
        ) -> StoreResult<Beneficiary> {
            self.seen.lock().unwrap().push(self.coordinator.state());
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

    #[tokio::test]
    async fn test_batch_with_missing_record_is_partial() {
        let store = store_with(&["B-1", "B-3"]);
        let sink = MemorySink::new();
        let coordinator = BatchCoordinator::new();

        let report = coordinator
            .run(
                &store,
                &sink,
                VerificationAction::Approve,
                &ids(&["B-1", "B-2", "B-3"]),
            )
            .await
            .unwrap();

        assert_eq!(report.requested, 3);
        assert_eq!(report.succeeded, ids(&["B-1", "B-3"]));
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].beneficiary_id, "B-2");
        assert!(!report.is_complete_success());

        let summaries = sink.entries_of_type("batch_identity_verified");
        assert_eq!(summaries.len(), 1);
        assert!(summaries[0].message.contains(" 2 "));
        assert_eq!(sink.entries_of_type("batch_record_failed").len(), 1);
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected() {
        let store = MemoryStore::new();
        let sink = MemorySink::new();

        let result = BatchCoordinator::new()
            .run(&store, &sink, VerificationAction::Approve, &[])
            .await;

        assert_eq!(result, Err(VerificationError::EmptyBatch));
        assert!(sink.entries().is_empty());
    }

    #[tokio::test]
    async fn test_state_is_running_only_while_records_settle() {
        let coordinator = BatchCoordinator::new();
        let store = ObservingStore {
            inner: store_with(&["B-1", "B-2"]),
            coordinator: coordinator.clone(),
            seen: std::sync::Mutex::new(Vec::new()),
        };
        let sink = MemorySink::new();

        assert_eq!(coordinator.state(), CoordinatorState::Idle);
        coordinator
            .run(
                &store,
                &sink,
                VerificationAction::RequestReupload,
                &ids(&["B-1", "B-2"]),
            )
            .await
            .unwrap();

        let seen = store.seen.lock().unwrap().clone();
        assert_eq!(seen, vec![CoordinatorState::Running, CoordinatorState::Running]);
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
    }

    #[tokio::test]
    async fn test_second_run_while_running_is_refused() {
        let coordinator = BatchCoordinator::new();
        let _held = coordinator.begin().unwrap();

        let store = store_with(&["B-1"]);
        let sink = MemorySink::new();
        let result = coordinator
            .run(&store, &sink, VerificationAction::Approve, &ids(&["B-1"]))
            .await;

        assert_eq!(result, Err(VerificationError::BatchInFlight));
        assert_eq!(
            store.get("B-1").await.unwrap().identity_status,
            IdentityStatus::Pending
        );
    }
}

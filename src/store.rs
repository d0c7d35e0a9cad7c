//! Record Store boundary.
//!
//! The verification workflow operates exclusively through [`RecordStore`],
//! so the SQLite store, the in-memory store, and test doubles are
//! interchangeable. Every call is a suspension point.

use crate::entities::{Beneficiary, IdentityStatus};
use crate::filter::BeneficiaryFilter;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Failures surfaced by a record store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The targeted id does not resolve.
    #[error("beneficiary not found: {0}")]
    NotFound(String),

    /// A record with the same identity already exists.
    #[error("beneficiary already exists: {0}")]
    Conflict(String),

    /// Connectivity, validation, or storage engine failure.
    #[error("record store failure: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, id: &str) -> StoreResult<Beneficiary>;

    /// Commit a new identity status together with its `updated_at`.
    /// Returns the record as stored after the write.
    async fn update_identity_status(
        &self,
        id: &str,
        status: IdentityStatus,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Beneficiary>;

    /// Records matching every provided filter, newest first.
    async fn list(&self, filter: &BeneficiaryFilter) -> StoreResult<Vec<Beneficiary>>;

    async fn insert(&self, beneficiary: &Beneficiary) -> StoreResult<()>;
    async fn delete(&self, id: &str) -> StoreResult<()>;
    async fn count(&self) -> StoreResult<usize>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// Process-local store used for tests and demos.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<HashMap<String, Beneficiary>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = Beneficiary>,
    {
        let map = records.into_iter().map(|b| (b.id.clone(), b)).collect();
        MemoryStore {
            records: Arc::new(RwLock::new(map)),
        }
    }
}

fn poisoned<E>(_: E) -> StoreError {
    StoreError::Backend("memory store lock poisoned".to_string())
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, id: &str) -> StoreResult<Beneficiary> {
        let records = self.records.read().map_err(poisoned)?;
        records
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn update_identity_status(
        &self,
        id: &str,
        status: IdentityStatus,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Beneficiary> {
        let mut records = self.records.write().map_err(poisoned)?;
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        record.identity_status = status;
        record.updated_at = updated_at;
        Ok(record.clone())
    }

    async fn list(&self, filter: &BeneficiaryFilter) -> StoreResult<Vec<Beneficiary>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(filter.apply(records.values().cloned()))
    }

    async fn insert(&self, beneficiary: &Beneficiary) -> StoreResult<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        if records.contains_key(&beneficiary.id) {
            return Err(StoreError::Conflict(beneficiary.id.clone()));
        }
        records.insert(beneficiary.id.clone(), beneficiary.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        records
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn count(&self) -> StoreResult<usize> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beneficiary(id: &str) -> Beneficiary {
        let mut b = Beneficiary::new("Test Person", &format!("9{}", id.len()), "0599");
        b.id = id.to_string();
        b
    }

    #[tokio::test]
    async fn test_insert_get_delete() {
        let store = MemoryStore::new();
        store.insert(&beneficiary("B-1")).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.get("B-1").await.unwrap().id, "B-1");

        let dup = store.insert(&beneficiary("B-1")).await;
        assert_eq!(dup, Err(StoreError::Conflict("B-1".to_string())));

        store.delete("B-1").await.unwrap();
        assert_eq!(
            store.get("B-1").await,
            Err(StoreError::NotFound("B-1".to_string()))
        );
    }

    #[tokio::test]
    async fn test_update_identity_status() {
        let store = MemoryStore::with_records(vec![beneficiary("B-1")]);
        let at = Utc::now();

        let updated = store
            .update_identity_status("B-1", IdentityStatus::Verified, at)
            .await
            .unwrap();
        assert_eq!(updated.identity_status, IdentityStatus::Verified);
        assert_eq!(updated.updated_at, at);

        let missing = store
            .update_identity_status("B-9", IdentityStatus::Verified, at)
            .await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_applies_filter() {
        let mut verified = beneficiary("B-2");
        verified.identity_status = IdentityStatus::Verified;
        let store = MemoryStore::with_records(vec![beneficiary("B-1"), verified]);

        let filter = BeneficiaryFilter::new().with_identity_status(IdentityStatus::Verified);
        let result = store.list(&filter).await.unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, "B-2");
    }
}

use crate::entities::{Beneficiary, IdentityStatus};
use crate::filter::BeneficiaryFilter;
use crate::store::{RecordStore, StoreError, StoreResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Event for audit trail ("Every change is an event")
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// Fixed-width UTC timestamps so text comparison in SQL is chronological
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Beneficiaries Table
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS beneficiaries (
            id TEXT PRIMARY KEY,
            idempotency_hash TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            full_name TEXT NOT NULL,
            national_id TEXT NOT NULL,
            phone TEXT NOT NULL,
            address TEXT NOT NULL,
            governorate TEXT,
            organization_id TEXT,
            family_id TEXT,
            identity_status TEXT NOT NULL DEFAULT 'pending',
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_identity_status ON beneficiaries(identity_status)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_status ON beneficiaries(status)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_created_at ON beneficiaries(created_at)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// CSV IMPORT
// ============================================================================

/// Load beneficiaries from CSV. Headers may use either naming convention.
pub fn load_csv(csv_path: &Path) -> Result<Vec<Beneficiary>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open CSV file")?;

    let mut beneficiaries = Vec::new();

    for (line, result) in rdr.deserialize().enumerate() {
        let row: HashMap<String, String> =
            result.with_context(|| format!("Failed to read CSV row {}", line + 2))?;

        // Blank cells mean "not provided", not "empty value"
        let record: serde_json::Map<String, serde_json::Value> = row
            .into_iter()
            .filter(|(_, v)| !v.trim().is_empty())
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();

        let beneficiary = Beneficiary::from_record(serde_json::Value::Object(record))
            .with_context(|| format!("Invalid beneficiary on CSV row {}", line + 2))?;
        beneficiaries.push(beneficiary);
    }

    Ok(beneficiaries)
}

/// Outcome of a bulk insert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub inserted: usize,
    pub duplicates: usize,
}

fn insert_row(conn: &Connection, b: &Beneficiary) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO beneficiaries (
            id, idempotency_hash, name, full_name, national_id, phone, address,
            governorate, organization_id, family_id, identity_status, status,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            b.id,
            b.idempotency_hash(),
            b.name,
            b.full_name,
            b.national_id,
            b.phone,
            b.address,
            b.governorate,
            b.organization_id,
            b.family_id,
            b.identity_status.as_str(),
            b.status.as_str(),
            format_timestamp(&b.created_at),
            format_timestamp(&b.updated_at),
        ],
    )
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Insert beneficiaries, skipping any whose national id is already on file
pub fn insert_beneficiaries(conn: &Connection, beneficiaries: &[Beneficiary]) -> Result<ImportStats> {
    let mut stats = ImportStats::default();

    for b in beneficiaries {
        match insert_row(conn, b) {
            Ok(_) => {
                stats.inserted += 1;

                // Log event to audit trail
                let event = Event::new(
                    "beneficiary_added",
                    "beneficiary",
                    &b.id,
                    serde_json::json!({
                        "name": b.display_name(),
                        "identity_status": b.identity_status.as_str(),
                    }),
                    "importer",
                );
                if let Err(e) = insert_event(conn, &event) {
                    warn!(id = %b.id, error = %e, "failed to record import event");
                }
            }
            Err(ref e) if is_constraint_violation(e) => {
                stats.duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!(
        inserted = stats.inserted,
        duplicates = stats.duplicates,
        "beneficiary import finished"
    );

    Ok(stats)
}

// ============================================================================
// EVENTS
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            format_timestamp(&event.timestamp),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: parse_column_timestamp(1, &timestamp_str)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
                })?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// BENEFICIARY QUERIES
// ============================================================================

const BENEFICIARY_COLUMNS: &str = "id, name, full_name, national_id, phone, address, governorate,
     organization_id, family_id, identity_status, status, created_at, updated_at";

fn parse_column_timestamp(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_column<T>(idx: usize, s: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = anyhow::Error>,
{
    s.parse()
        .map_err(|e: anyhow::Error| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn row_to_beneficiary(row: &Row<'_>) -> rusqlite::Result<Beneficiary> {
    let identity_status: String = row.get(9)?;
    let status: String = row.get(10)?;
    let created_at: String = row.get(11)?;
    let updated_at: String = row.get(12)?;

    Ok(Beneficiary {
        id: row.get(0)?,
        name: row.get(1)?,
        full_name: row.get(2)?,
        national_id: row.get(3)?,
        phone: row.get(4)?,
        address: row.get(5)?,
        governorate: row.get(6)?,
        organization_id: row.get(7)?,
        family_id: row.get(8)?,
        identity_status: parse_column(9, &identity_status)?,
        status: parse_column(10, &status)?,
        created_at: parse_column_timestamp(11, &created_at)?,
        updated_at: parse_column_timestamp(12, &updated_at)?,
    })
}

pub fn get_beneficiary(conn: &Connection, id: &str) -> StoreResult<Beneficiary> {
    let sql = format!("SELECT {} FROM beneficiaries WHERE id = ?1", BENEFICIARY_COLUMNS);
    conn.query_row(&sql, [id], row_to_beneficiary)
        .optional()?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))
}

/// List beneficiaries matching a filter, newest first.
///
/// Exact-match filters run in SQL; the free-text search reuses
/// `BeneficiaryFilter::matches` so both stores agree on case folding.
pub fn list_beneficiaries(conn: &Connection, filter: &BeneficiaryFilter) -> StoreResult<Vec<Beneficiary>> {
    let now = Utc::now();
    let mut sql = format!("SELECT {} FROM beneficiaries WHERE 1 = 1", BENEFICIARY_COLUMNS);
    let mut values: Vec<Value> = Vec::new();

    if let Some(status) = filter.status {
        values.push(Value::Text(status.as_str().to_string()));
        sql.push_str(&format!(" AND status = ?{}", values.len()));
    }
    if let Some(identity) = filter.identity_status {
        values.push(Value::Text(identity.as_str().to_string()));
        sql.push_str(&format!(" AND identity_status = ?{}", values.len()));
    }
    if let Some(governorate) = &filter.governorate {
        values.push(Value::Text(governorate.clone()));
        sql.push_str(&format!(" AND governorate = ?{}", values.len()));
    }
    if let Some(window) = filter.created_within {
        values.push(Value::Text(format_timestamp(&window.start(now))));
        sql.push_str(&format!(" AND created_at >= ?{}", values.len()));
    }
    sql.push_str(" ORDER BY created_at DESC, id DESC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values.iter()), row_to_beneficiary)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows.into_iter().filter(|b| filter.matches(b, now)).collect())
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM beneficiaries", [], |row| row.get(0))?;

    Ok(count)
}

// ============================================================================
// SQLITE RECORD STORE
// ============================================================================

/// `RecordStore` over a shared SQLite connection.
///
/// The connection is shared with `SqliteAuditSink`, so audit events land in
/// the same database file as the records they describe.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database {:?}", db_path))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::Backend("database connection lock poisoned".to_string()))?;
        f(&conn)
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn get(&self, id: &str) -> StoreResult<Beneficiary> {
        self.with_conn(|conn| get_beneficiary(conn, id))
    }

    async fn update_identity_status(
        &self,
        id: &str,
        status: IdentityStatus,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Beneficiary> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE beneficiaries SET identity_status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), format_timestamp(&updated_at), id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(id.to_string()));
            }
            debug!(id, status = %status, "identity status committed");
            get_beneficiary(conn, id)
        })
    }

    async fn list(&self, filter: &BeneficiaryFilter) -> StoreResult<Vec<Beneficiary>> {
        self.with_conn(|conn| list_beneficiaries(conn, filter))
    }

    async fn insert(&self, beneficiary: &Beneficiary) -> StoreResult<()> {
        self.with_conn(|conn| match insert_row(conn, beneficiary) {
            Ok(_) => Ok(()),
            Err(ref e) if is_constraint_violation(e) => {
                Err(StoreError::Conflict(beneficiary.id.clone()))
            }
            Err(e) => Err(e.into()),
        })
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM beneficiaries WHERE id = ?1", [id])?;
            if removed == 0 {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Ok(())
        })
    }

    async fn count(&self) -> StoreResult<usize> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM beneficiaries", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::AccountStatus;
    use crate::filter::DateWindow;
    use crate::store::MemoryStore;
    use chrono::Duration;
    use std::io::Write;

    /// Helper function to create test beneficiaries with all required fields
    fn create_test_beneficiary(id: &str, name: &str, national_id: &str) -> Beneficiary {
        let mut b = Beneficiary::new(name, national_id, "0599000000");
        b.id = id.to_string();
        b.governorate = Some("Gaza".to_string());
        b
    }

    #[test]
    fn test_idempotency_import_twice() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let beneficiaries = vec![
            create_test_beneficiary("B-1", "Amal Hassan", "900000001"),
            create_test_beneficiary("B-2", "Omar Said", "900000002"),
            create_test_beneficiary("B-3", "Layla Nasser", "900000003"),
        ];

        let first = insert_beneficiaries(&conn, &beneficiaries).unwrap();
        let count1 = verify_count(&conn).unwrap();

        // Same people under fresh ids are still duplicates by national id
        let reimport: Vec<Beneficiary> = beneficiaries
            .iter()
            .map(|b| {
                let mut copy = b.clone();
                copy.id = uuid::Uuid::new_v4().to_string();
                copy
            })
            .collect();
        let second = insert_beneficiaries(&conn, &reimport).unwrap();
        let count2 = verify_count(&conn).unwrap();

        assert_eq!(first, ImportStats { inserted: 3, duplicates: 0 });
        assert_eq!(count1, 3);
        assert_eq!(second, ImportStats { inserted: 0, duplicates: 3 });
        assert_eq!(count2, 3);

        let events = get_events_for_entity(&conn, "beneficiary", "B-1").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "beneficiary_added");
    }

    #[test]
    fn test_event_log() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let event = Event::new(
            "test_event",
            "beneficiary",
            "test_id_123",
            serde_json::json!({"test": "data"}),
            "test_actor",
        );

        insert_event(&conn, &event).unwrap();

        let events = get_events_for_entity(&conn, "beneficiary", "test_id_123").unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "test_event");
        assert_eq!(events[0].actor, "test_actor");
        assert_eq!(events[0].data["test"], "data");
    }

    #[test]
    fn test_load_csv_accepts_both_header_styles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beneficiaries.csv");

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "id,fullName,nationalId,phone,identityStatus,status,createdAt").unwrap();
        writeln!(file, "B-10,Amal Hassan,900000010,0599000010,verified,active,2024-02-01").unwrap();
        writeln!(file, "B-11,Omar Said,900000011,0599000011,,,").unwrap();
        drop(file);

        let loaded = load_csv(&path).unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, "B-10");
        assert_eq!(loaded[0].identity_status, IdentityStatus::Verified);
        assert_eq!(loaded[1].identity_status, IdentityStatus::Pending);
        assert_eq!(loaded[1].status, AccountStatus::Active);
    }

    #[tokio::test]
    async fn test_people_without_national_id_are_not_duplicates() {
        let amal = Beneficiary::from_record(serde_json::json!({ "id": "X-1", "name": "Amal" })).unwrap();
        let omar = Beneficiary::from_record(serde_json::json!({ "id": "X-2", "name": "Omar" })).unwrap();
        let huda = Beneficiary::from_record(serde_json::json!({ "id": "X-3", "name": "Huda" })).unwrap();

        let sqlite = SqliteStore::open_in_memory().unwrap();
        let memory = MemoryStore::new();
        for store in [&sqlite as &dyn RecordStore, &memory as &dyn RecordStore] {
            store.insert(&amal).await.unwrap();
            store.insert(&omar).await.unwrap();
            assert_eq!(store.count().await.unwrap(), 2);
        }

        let conn = sqlite.connection();
        let conn = conn.lock().unwrap();
        let stats = insert_beneficiaries(&conn, &[huda.clone(), huda]).unwrap();
        assert_eq!(stats, ImportStats { inserted: 1, duplicates: 1 });
    }

    #[tokio::test]
    async fn test_sqlite_store_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let b = create_test_beneficiary("B-1", "Amal Hassan", "900000001");
        store.insert(&b).await.unwrap();

        let loaded = store.get("B-1").await.unwrap();
        assert_eq!(loaded.display_name(), "Amal Hassan");
        assert_eq!(loaded.identity_status, IdentityStatus::Pending);

        let dup = store.insert(&b).await;
        assert_eq!(dup, Err(StoreError::Conflict("B-1".to_string())));

        assert_eq!(store.count().await.unwrap(), 1);
        store.delete("B-1").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(matches!(store.delete("B-1").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_sqlite_update_identity_status() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut b = create_test_beneficiary("B-100", "Jane Doe", "900000100");
        b.identity_status = IdentityStatus::Rejected;
        b.updated_at = Utc::now() - Duration::days(2);
        store.insert(&b).await.unwrap();

        let at = Utc::now();
        let updated = store
            .update_identity_status("B-100", IdentityStatus::Pending, at)
            .await
            .unwrap();

        assert_eq!(updated.identity_status, IdentityStatus::Pending);
        assert!(updated.updated_at > b.updated_at);
        assert_eq!(format_timestamp(&updated.updated_at), format_timestamp(&at));

        let missing = store
            .update_identity_status("B-404", IdentityStatus::Verified, at)
            .await;
        assert_eq!(missing, Err(StoreError::NotFound("B-404".to_string())));
    }

    #[tokio::test]
    async fn test_sqlite_list_filters() {
        let store = SqliteStore::open_in_memory().unwrap();

        let mut a = create_test_beneficiary("B-1", "Amal Hassan", "900000001");
        a.identity_status = IdentityStatus::Verified;
        let mut b = create_test_beneficiary("B-2", "Omar Said", "900000002");
        b.created_at = Utc::now() - Duration::days(40);
        b.governorate = Some("Rafah".to_string());
        let c = create_test_beneficiary("B-3", "Layla Nasser", "900000003");

        for x in [&a, &b, &c] {
            store.insert(x).await.unwrap();
        }

        let verified = store
            .list(&BeneficiaryFilter::new().with_identity_status(IdentityStatus::Verified))
            .await
            .unwrap();
        assert_eq!(verified.len(), 1);
        assert_eq!(verified[0].id, "B-1");

        let recent = store
            .list(&BeneficiaryFilter::new().created_within(DateWindow::Month))
            .await
            .unwrap();
        assert_eq!(recent.len(), 2);

        let searched = store
            .list(&BeneficiaryFilter::new().with_search("LAYLA").with_governorate("Gaza"))
            .await
            .unwrap();
        assert_eq!(searched.len(), 1);
        assert_eq!(searched[0].id, "B-3");

        let all = store.list(&BeneficiaryFilter::new()).await.unwrap();
        assert_eq!(all.last().map(|b| b.id.as_str()), Some("B-2"));
    }
}

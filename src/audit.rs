// Audit/Notification Sink - fire-and-forget record of what operators did
//
// The workflow never waits on, or fails because of, the sink. Implementations
// swallow their own errors after reporting them through tracing.

use crate::db::{get_events_for_entity, insert_event, Event};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

// ============================================================================
// AUDIT ENTRY
// ============================================================================

/// Structured form of an audit event.
///
/// `message` and `source` are what every sink must handle; `event_type` and
/// `entity_id` let persistent sinks index the entry per beneficiary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub event_type: String,
    pub entity_id: Option<String>,
    pub message: String,
    pub source: String,
}

impl AuditEntry {
    pub fn new(event_type: &str, message: String, source: &str) -> Self {
        AuditEntry {
            event_type: event_type.to_string(),
            entity_id: None,
            message,
            source: source.to_string(),
        }
    }

    pub fn for_entity(mut self, entity_id: &str) -> Self {
        self.entity_id = Some(entity_id.to_string());
        self
    }
}

// ============================================================================
// SINK TRAIT
// ============================================================================

pub trait AuditSink: Send + Sync {
    /// Record a human-readable message tagged with its source. Never fails.
    fn log_event(&self, message: &str, source: &str);

    /// Record a structured entry. Sinks without an index just log the message.
    fn record(&self, entry: &AuditEntry) {
        self.log_event(&entry.message, &entry.source);
    }
}

/// Writes audit entries to the `audit` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn log_event(&self, message: &str, source: &str) {
        info!(target: "audit", source, "{}", message);
    }

    fn record(&self, entry: &AuditEntry) {
        info!(
            target: "audit",
            source = %entry.source,
            event_type = %entry.event_type,
            entity_id = entry.entity_id.as_deref().unwrap_or("-"),
            "{}",
            entry.message
        );
    }
}

/// Persists audit entries into the `events` table.
#[derive(Clone)]
pub struct SqliteAuditSink {
    conn: Arc<Mutex<Connection>>,
    actor: String,
}

impl SqliteAuditSink {
    pub fn new(conn: Arc<Mutex<Connection>>, actor: &str) -> Self {
        SqliteAuditSink {
            conn,
            actor: actor.to_string(),
        }
    }

    fn persist(&self, entry: &AuditEntry) -> anyhow::Result<()> {
        let event = Event::new(
            &entry.event_type,
            "beneficiary",
            entry.entity_id.as_deref().unwrap_or(""),
            serde_json::json!({
                "message": entry.message,
                "source": entry.source,
            }),
            &self.actor,
        );

        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database connection lock poisoned"))?;
        insert_event(&conn, &event)
    }

    /// Audit history of one beneficiary, newest first
    pub fn events_for(&self, beneficiary_id: &str) -> anyhow::Result<Vec<Event>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database connection lock poisoned"))?;
        get_events_for_entity(&conn, "beneficiary", beneficiary_id)
    }
}

impl AuditSink for SqliteAuditSink {
    fn log_event(&self, message: &str, source: &str) {
        self.record(&AuditEntry::new("log", message.to_string(), source));
    }

    fn record(&self, entry: &AuditEntry) {
        if let Err(e) = self.persist(entry) {
            warn!(error = %e, event_type = %entry.event_type, "failed to persist audit event");
        }
    }
}

/// Keeps every entry in memory. Used by tests and the terminal dashboard.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.message).collect()
    }

    pub fn entries_of_type(&self, event_type: &str) -> Vec<AuditEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl AuditSink for MemorySink {
    fn log_event(&self, message: &str, source: &str) {
        self.record(&AuditEntry::new("log", message.to_string(), source));
    }

    fn record(&self, entry: &AuditEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry.clone());
        }
    }
}

/// Forwards every entry to each inner sink in order.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        FanoutSink { sinks }
    }
}

impl AuditSink for FanoutSink {
    fn log_event(&self, message: &str, source: &str) {
        for sink in &self.sinks {
            sink.log_event(message, source);
        }
    }

    fn record(&self, entry: &AuditEntry) {
        for sink in &self.sinks {
            sink.record(entry);
        }
    }
}

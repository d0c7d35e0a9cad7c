// Relief Desk - Core Library
// Identity verification workflow for aid beneficiaries, shared by the CLI,
// the TUI, the API server, and the tests

pub mod entities;     // Beneficiary model + boundary adapter
pub mod filter;       // Filters, sorting, paging, statistics
pub mod store;        // Record Store boundary + in-memory store
pub mod db;           // SQLite store, CSV import, event log
pub mod audit;        // Audit/Notification sinks
pub mod verification; // Verification State Machine
pub mod confirmation; // Action Confirmation Gate
pub mod batch;        // Batch Coordinator
pub mod selection;    // Selection Set
pub mod workflow;     // Verification Controller
pub mod config;
pub mod logging;
pub mod mock;

// Re-export commonly used types
pub use entities::{AccountStatus, Beneficiary, IdentityStatus};
pub use filter::{
    BeneficiaryFilter, DateWindow, Page, Sort, SortDirection, SortKey, Statistics,
    DEFAULT_PAGE_SIZE,
};
pub use store::{MemoryStore, RecordStore, StoreError, StoreResult};
pub use db::{
    Event, ImportStats, SqliteStore,
    load_csv, setup_database, insert_beneficiaries,
    verify_count, insert_event, get_events_for_entity,
};
pub use audit::{AuditEntry, AuditSink, FanoutSink, MemorySink, SqliteAuditSink, TracingSink};
pub use verification::{VerificationAction, VerificationError, AUDIT_SOURCE};
pub use confirmation::{describe, ConfirmationPreview, PendingAction, Severity};
pub use batch::{BatchCoordinator, BatchFailure, BatchReport, CoordinatorState};
pub use selection::SelectionSet;
pub use workflow::{ConfirmOutcome, VerificationController};
pub use config::AppConfig;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

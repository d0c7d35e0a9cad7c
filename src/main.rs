// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Context, Result};
use std::env;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Runtime;

// Use library instead of local modules
use relief_desk::{
    insert_beneficiaries, load_csv, logging, mock, verify_count, AppConfig, AuditSink,
    BeneficiaryFilter, ConfirmOutcome, FanoutSink, RecordStore, SqliteAuditSink, SqliteStore,
    TracingSink, VerificationAction, VerificationController,
};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    // The dashboard owns the terminal; stay quiet there unless RUST_LOG is set
    match command {
        None | Some("ui") => logging::init("off"),
        Some(_) => logging::init("info"),
    }

    let config = AppConfig::load()?;
    let runtime = Runtime::new().context("Failed to start async runtime")?;

    match command {
        Some("import") => {
            let csv_path = args
                .get(2)
                .context("Usage: relief-desk import <beneficiaries.csv>")?;
            run_import(&config, Path::new(csv_path))
        }
        Some("seed") => runtime.block_on(run_seed(&config)),
        Some("stats") => runtime.block_on(run_stats(&config)),
        Some("approve") => runtime.block_on(run_decision(
            &config,
            VerificationAction::Approve,
            &args[2..],
        )),
        Some("reupload") => runtime.block_on(run_decision(
            &config,
            VerificationAction::RequestReupload,
            &args[2..],
        )),
        Some("history") => {
            let id = args.get(2).context("Usage: relief-desk history <beneficiary-id>")?;
            run_history(&config, id)
        }
        None | Some("ui") => run_ui_mode(&config, &runtime),
        Some("help") | Some("--help") | Some("-h") => {
            print_usage();
            Ok(())
        }
        Some(other) => {
            print_usage();
            bail!("Unknown command: {}", other)
        }
    }
}

fn print_usage() {
    println!("relief-desk {}", relief_desk::VERSION);
    println!();
    println!("USAGE:");
    println!("  relief-desk                          Open the verification dashboard");
    println!("  relief-desk import <file.csv>        Import beneficiaries from CSV");
    println!("  relief-desk seed                     Insert demonstration records if empty");
    println!("  relief-desk stats                    Print verification statistics");
    println!("  relief-desk approve <id>... [--yes]  Verify identity (batch if several ids)");
    println!("  relief-desk reupload <id>... [--yes] Request new identity documents");
    println!("  relief-desk history <id>             Show the audit trail of a beneficiary");
}

fn open_store(config: &AppConfig) -> Result<SqliteStore> {
    SqliteStore::open(&config.database_path)
}

/// Every surface logs audit entries to tracing and persists them next to the records
fn audit_sinks(store: &SqliteStore, config: &AppConfig) -> Vec<Arc<dyn AuditSink>> {
    vec![
        Arc::new(TracingSink),
        Arc::new(SqliteAuditSink::new(store.connection(), &config.actor)),
    ]
}

fn run_import(config: &AppConfig, csv_path: &Path) -> Result<()> {
    println!("🗄️  Beneficiary Import - CSV → SQLite + WAL");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load CSV
    println!("\n📂 Loading CSV...");
    let beneficiaries = load_csv(csv_path)?;
    println!("✓ Loaded {} beneficiaries from {:?}", beneficiaries.len(), csv_path);

    // 2. Setup database
    println!("\n🔧 Opening database...");
    let store = open_store(config)?;
    println!("✓ Database ready at {:?} (WAL mode)", config.database_path);

    // 3. Insert beneficiaries
    println!("\n💾 Inserting beneficiaries...");
    let conn = store.connection();
    let conn = conn
        .lock()
        .map_err(|_| anyhow::anyhow!("database connection lock poisoned"))?;
    let stats = insert_beneficiaries(&conn, &beneficiaries)?;

    // 4. Verify count
    println!("\n🔍 Verifying database...");
    let count = verify_count(&conn)?;

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ Import complete");
    println!("✓ Inserted:   {}", stats.inserted);
    println!("✓ Duplicates: {}", stats.duplicates);
    println!("✓ Database now holds {} beneficiaries", count);

    Ok(())
}

async fn run_seed(config: &AppConfig) -> Result<()> {
    let store = open_store(config)?;
    let inserted = mock::seed_if_empty(&store).await?;

    if inserted == 0 {
        println!("ℹ️  Store already holds {} beneficiaries; nothing seeded", store.count().await?);
    } else {
        println!("✓ Seeded {} demonstration beneficiaries", inserted);
    }
    Ok(())
}

async fn run_stats(config: &AppConfig) -> Result<()> {
    let store = open_store(config)?;
    let mut controller = VerificationController::new(
        Arc::new(store),
        Arc::new(TracingSink),
    );
    controller.set_filter(BeneficiaryFilter::default()).await?;
    let stats = controller.statistics();

    println!("📊 Identity verification");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  Total:     {}", stats.total);
    println!("  Verified:  {}", stats.verified);
    println!("  Pending:   {}", stats.pending);
    println!("  Rejected:  {}", stats.rejected);
    println!();
    println!("  Active:    {}", stats.active);
    println!("  Suspended: {}", stats.suspended);
    Ok(())
}

async fn run_decision(config: &AppConfig, action: VerificationAction, args: &[String]) -> Result<()> {
    let confirmed = args.iter().any(|a| a == "--yes" || a == "-y");
    let ids: Vec<String> = args
        .iter()
        .filter(|a| !a.starts_with('-'))
        .cloned()
        .collect();

    if ids.is_empty() {
        bail!("At least one beneficiary id is required");
    }

    let store = open_store(config)?;
    let sink = FanoutSink::new(audit_sinks(&store, config));
    let mut controller = VerificationController::new(Arc::new(store.clone()), Arc::new(sink))
        .with_page_size(config.page_size);

    if let [id] = ids.as_slice() {
        let beneficiary = store
            .get(id)
            .await
            .with_context(|| format!("Cannot stage action for {}", id))?;

        if !action.is_meaningful_from(beneficiary.identity_status) {
            println!(
                "ℹ️  {} is already {}; the action will only refresh its timestamp",
                beneficiary.display_name(),
                beneficiary.identity_status
            );
        }

        match action {
            VerificationAction::Approve => {
                controller.approve(&beneficiary.id, beneficiary.display_name());
            }
            VerificationAction::RequestReupload => {
                controller.request_reupload(&beneficiary.id, beneficiary.display_name());
            }
        }
    } else {
        match action {
            VerificationAction::Approve => controller.batch_approve(ids)?,
            VerificationAction::RequestReupload => controller.batch_request_reupload(ids)?,
        };
    }

    let preview = controller
        .preview()
        .context("No action was staged")?;
    println!("{}", preview.title);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{}\n", preview.message);

    if !confirmed {
        controller.cancel();
        println!("Nothing changed. Re-run with --yes to: {}", preview.confirm_label);
        return Ok(());
    }

    match controller.confirm().await? {
        ConfirmOutcome::Single { beneficiary } => {
            println!(
                "✅ {} is now {}",
                beneficiary.display_name(),
                beneficiary.identity_status
            );
        }
        ConfirmOutcome::Batch { report } => {
            println!(
                "✅ {} of {} beneficiaries updated",
                report.succeeded_count(),
                report.requested
            );
            for failure in &report.failed {
                println!("❌ {}: {}", failure.beneficiary_id, failure.error);
            }
        }
        ConfirmOutcome::NothingPending => println!("Nothing to confirm"),
    }

    Ok(())
}

fn run_history(config: &AppConfig, id: &str) -> Result<()> {
    let store = open_store(config)?;
    let audit = SqliteAuditSink::new(store.connection(), &config.actor);
    let events = audit.events_for(id)?;

    if events.is_empty() {
        println!("No audit events for {}", id);
        return Ok(());
    }

    println!("🧾 Audit trail for {}", id);
    for event in events {
        let message = event.data["message"].as_str().unwrap_or("");
        println!(
            "  {}  {:<26} {:<10} {}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event.event_type,
            event.actor,
            message
        );
    }
    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &AppConfig, runtime: &Runtime) -> Result<()> {
    println!("🖥️  Loading Relief Desk...\n");

    let store = open_store(config)?;
    if config.seed_mock_data {
        runtime.block_on(mock::seed_if_empty(&store))?;
    }

    let activity = relief_desk::MemorySink::new();
    let mut sinks = audit_sinks(&store, config);
    sinks.push(Arc::new(activity.clone()));

    let mut controller = VerificationController::new(
        Arc::new(store),
        Arc::new(FanoutSink::new(sinks)),
    )
    .with_page_size(config.page_size);
    runtime.block_on(controller.refresh())?;

    println!("✓ Loaded {} beneficiaries", controller.beneficiaries().len());
    println!("Starting UI... (Press 'q' to quit)\n");

    let mut app = ui::App::new(controller, runtime.handle().clone(), activity);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &AppConfig, _runtime: &Runtime) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the API: cargo run --bin relief-server --features server");
    std::process::exit(1);
}

//! tamperlog shop reference demo and ledger CLI
//!
//! Runs the shop scenarios against scratch in-memory chains, or operates on a
//! persistent ledger (append, verify, list, export).
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- concurrent --workers 32
//!   cargo run -p demo -- --db var/audit.db append --entity Product --action created --entity-id 42
//!   cargo run -p demo -- --db var/audit.db verify
//!   cargo run -p demo -- --config config/tamperlog.toml list --page 2

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use tamperlog_audit::AppendOutcome;
use tamperlog_config::{StoreBackend, TamperlogConfig};
use tamperlog_contracts::event::{AuditAction, AuditEvent, DedupKey};
use tamperlog_core::traits::AuditStore;
use tamperlog_ref_shop::{
    scenarios::{concurrent_writers, product_lifecycle, redelivery, tamper_drill},
    shop_config, AuditRuntime,
};

type DemoResult = Result<(), Box<dyn Error>>;

// ── CLI definition ────────────────────────────────────────────────────────────

/// tamperlog: a tamper-evident, hash-chained audit trail.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "tamperlog shop reference demo",
    long_about = "Runs tamperlog shop scenarios showing genesis and linking, redelivery\n\
                  collapse, concurrent appends, and tamper detection, or operates on a\n\
                  persistent ledger."
)]
struct Cli {
    /// TOML configuration file. Defaults to the embedded shop settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use a SQLite ledger at this path, overriding `[store]`.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all four shop scenarios in sequence.
    RunAll,
    /// Scenario 1: genesis, linking, and a redelivered create.
    ProductLifecycle,
    /// Scenario 2: duplicate publishes and lost acks.
    Redelivery,
    /// Scenario 3: concurrent writers across two engines.
    Concurrent {
        #[arg(long, default_value_t = concurrent_writers::DEFAULT_WORKERS)]
        workers: usize,
    },
    /// Scenario 4: edited and re-hashed entries.
    Tamper,
    /// Append one event to the ledger.
    Append {
        #[arg(long)]
        entity: String,
        /// created, modified, or deleted.
        #[arg(long)]
        action: AuditAction,
        #[arg(long)]
        entity_id: String,
        /// Defaults to a fresh random key.
        #[arg(long)]
        dedup_key: Option<String>,
        #[arg(long)]
        old_values: Option<String>,
        #[arg(long)]
        new_values: Option<String>,
        #[arg(long)]
        user_id: Option<String>,
        #[arg(long)]
        user_email: Option<String>,
        #[arg(long)]
        correlation_id: Option<String>,
    },
    /// Verify the ledger, or the inclusive range `--from..=--to`.
    Verify {
        #[arg(long)]
        from: Option<u64>,
        #[arg(long)]
        to: Option<u64>,
    },
    /// List ledger entries, newest first.
    List {
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long)]
        page_size: Option<u64>,
    },
    /// Export ledger entries as JSON.
    Export {
        #[arg(long)]
        from: Option<u64>,
        #[arg(long)]
        to: Option<u64>,
        /// Write to this file instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let result = load_config(cli.config.as_deref(), cli.db).and_then(|config| {
        match cli.command {
            Command::RunAll => run_all(&config),
            Command::ProductLifecycle => scenario(|| product_lifecycle::run_scenario(&config)),
            Command::Redelivery => scenario(|| redelivery::run_scenario(&config)),
            Command::Concurrent { workers } => {
                scenario(|| concurrent_writers::run_scenario(&config, workers))
            }
            Command::Tamper => scenario(|| tamper_drill::run_scenario(&config)),
            Command::Append {
                entity,
                action,
                entity_id,
                dedup_key,
                old_values,
                new_values,
                user_id,
                user_email,
                correlation_id,
            } => {
                let mut event = AuditEvent::new(
                    dedup_key.map(DedupKey::from).unwrap_or_default(),
                    entity,
                    action,
                    entity_id,
                    Utc::now(),
                )
                .with_values(old_values, new_values);
                event.user_id = user_id;
                event.user_email = user_email;
                event.correlation_id = correlation_id;
                append(&config, &event)
            }
            Command::Verify { from, to } => verify(&config, from, to),
            Command::List { page, page_size } => list(&config, page, page_size),
            Command::Export { from, to, out } => export(&config, from, to, out.as_deref()),
        }
    });

    if let Err(e) = result {
        eprintln!("Demo error: {}", e);
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>, db: Option<PathBuf>) -> Result<TamperlogConfig, Box<dyn Error>> {
    let mut config = match path {
        Some(path) => TamperlogConfig::from_file(path)?,
        None => shop_config()?,
    };
    if let Some(db) = db {
        config.store.backend = StoreBackend::Sqlite;
        config.store.path = Some(db);
    }
    config.validate()?;
    Ok(config)
}

// ── Scenario dispatch ─────────────────────────────────────────────────────────

fn scenario(run: impl FnOnce() -> tamperlog_contracts::error::AuditResult<()>) -> DemoResult {
    print_banner();
    run()?;
    println!("All selected scenarios completed successfully.");
    Ok(())
}

fn run_all(config: &TamperlogConfig) -> DemoResult {
    scenario(|| {
        product_lifecycle::run_scenario(config)?;
        redelivery::run_scenario(config)?;
        concurrent_writers::run_scenario(config, concurrent_writers::DEFAULT_WORKERS)?;
        tamper_drill::run_scenario(config)
    })
}

// ── Ledger commands ───────────────────────────────────────────────────────────

fn open_ledger(config: &TamperlogConfig) -> Result<AuditRuntime, Box<dyn Error>> {
    if config.store.backend == StoreBackend::Memory {
        warn!("ledger is in memory and will be discarded on exit; pass --db to persist it");
    }
    Ok(AuditRuntime::open(config)?)
}

fn append(config: &TamperlogConfig, event: &AuditEvent) -> DemoResult {
    let runtime = open_ledger(config)?;
    match runtime.engine.submit(event, &CancellationToken::new())? {
        AppendOutcome::Appended(entry) => {
            println!("Appended   sequence {}  key {}", entry.sequence, entry.event.dedup_key);
            println!("  previous hash  {}", entry.previous_hash);
            println!("  hash           {}", entry.hash);
        }
        AppendOutcome::DuplicateIgnored(entry) => {
            println!(
                "Duplicate  key {} already stored at sequence {}",
                entry.event.dedup_key, entry.sequence
            );
        }
    }
    Ok(())
}

/// Resolve an optional range against the current tail. `None` means the
/// ledger is empty and no explicit bound was given.
fn resolve_range(
    runtime: &AuditRuntime,
    from: Option<u64>,
    to: Option<u64>,
) -> Result<Option<(u64, u64)>, Box<dyn Error>> {
    let to = match to {
        Some(to) => to,
        None => match runtime.store.tail()? {
            Some(tail) => tail.sequence,
            None if from.is_none() => return Ok(None),
            None => 0,
        },
    };
    Ok(Some((from.unwrap_or(0), to)))
}

fn verify(config: &TamperlogConfig, from: Option<u64>, to: Option<u64>) -> DemoResult {
    let runtime = open_ledger(config)?;
    let report = match resolve_range(&runtime, from, to)? {
        Some((from, to)) => runtime.verifier.verify(from, to)?,
        None => runtime.verifier.verify_all()?,
    };

    println!("Range:            {}..={}", report.from, report.to);
    println!("Entries checked:  {}", report.entries_checked);
    match report.last_verified {
        Some(seq) => println!("Last verified:    {}", seq),
        None => println!("Last verified:    -"),
    }
    println!("Outcome:          {}", report.outcome);

    match report.violation() {
        None => Ok(()),
        Some(violation) => Err(format!("chain verification failed: {}", violation).into()),
    }
}

fn list(config: &TamperlogConfig, page: u64, page_size: Option<u64>) -> DemoResult {
    let runtime = open_ledger(config)?;
    let page = runtime
        .query
        .list_page(page, page_size.unwrap_or(runtime.default_page_size))?;

    println!(
        "Page {} of {}  ({} entries total)",
        page.page_number,
        page.total_pages(),
        page.total_count
    );
    println!();
    println!("{:>6}  {:<9} {:<24} {:<10} {}", "SEQ", "ACTION", "ENTITY", "HASH", "OCCURRED AT");
    for entry in &page.items {
        let entity = format!("{}/{}", entry.event.entity_name, entry.event.entity_id);
        println!(
            "{:>6}  {:<9} {:<24} {:<10} {}",
            entry.sequence,
            entry.event.action.as_str(),
            entity,
            entry.hash.get(..8).unwrap_or(&entry.hash),
            entry.event.occurred_at.to_rfc3339()
        );
    }
    if page.has_previous_page() || page.has_next_page() {
        println!();
        println!(
            "previous: {}  next: {}",
            if page.has_previous_page() { "yes" } else { "no" },
            if page.has_next_page() { "yes" } else { "no" }
        );
    }
    Ok(())
}

fn export(
    config: &TamperlogConfig,
    from: Option<u64>,
    to: Option<u64>,
    out: Option<&Path>,
) -> DemoResult {
    let runtime = open_ledger(config)?;
    let snapshot = match resolve_range(&runtime, from, to)? {
        Some((from, to)) => runtime.query.export(from, to)?,
        None => runtime.query.export_all()?,
    };
    let json = serde_json::to_string_pretty(&snapshot)?;

    match out {
        Some(path) => {
            fs::write(path, json)?;
            eprintln!(
                "Exported {} entries to {}",
                snapshot.entries.len(),
                path.display()
            );
        }
        None => println!("{}", json),
    }
    Ok(())
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("tamperlog: Tamper-evident Audit Chain");
    println!("Shop Reference Demo");
    println!("=====================================");
    println!();
    println!("Per delivered event:");
    println!("  [1] Dedup lookup: a redelivered key returns the stored entry");
    println!("  [2] Read the chain tail under the tail lock");
    println!("  [3] Link: sequence = tail + 1, previous hash = tail hash (genesis on empty)");
    println!("  [4] Hash: SHA-256 over the canonical encoding and the previous hash");
    println!("  [5] Insert; a lost race on sequence or key retries from [1]");
    println!();
}

//! Scenario 4: Tamper Drill
//!
//! Builds a clean chain, exports it, and then plays two attackers against the
//! export:
//!
//! - A careless one edits a stored price without touching the hash. The
//!   verifier reports `HashMismatch` at the edited entry while the prefix
//!   before it still verifies.
//! - A careful one edits the price and recomputes that entry's hash. The
//!   successor's `previous_hash` no longer matches, so the verifier reports
//!   `BrokenLink` one entry later.

use std::sync::Arc;

use tamperlog_audit::{recompute, InMemoryAuditStore};
use tamperlog_config::TamperlogConfig;
use tamperlog_contracts::{
    entry::{AuditEntry, ChainSnapshot},
    error::AuditResult,
    verify::VerificationReport,
};
use tamperlog_core::traits::AuditStore;
use tamperlog_verify::{verify_snapshot, ChainVerifier};

use crate::mock_data::storefront_traffic;
use crate::runtime::AuditRuntime;
use crate::scenarios::short;

pub const DRILL_LENGTH: usize = 8;
pub const TAMPERED_AT: u64 = 5;

const FORGED_VALUES: &str = r#"{"Name":"Espresso Grinder","Category":"kitchen","PriceCents":1}"#;

pub struct TamperSummary {
    pub clean: VerificationReport,
    pub edited: VerificationReport,
    pub edited_prefix: VerificationReport,
    pub forged: VerificationReport,
}

/// Copy of `entries` with the entry at `at` given forged values.
fn edit(entries: &[AuditEntry], at: u64, rehash: bool) -> Vec<AuditEntry> {
    entries
        .iter()
        .cloned()
        .map(|mut entry| {
            if entry.sequence == at {
                entry.event.new_values = Some(FORGED_VALUES.to_string());
                if rehash {
                    entry.hash = recompute(&entry);
                }
            }
            entry
        })
        .collect()
}

pub fn run(runtime: &AuditRuntime) -> AuditResult<TamperSummary> {
    for event in storefront_traffic("drill", DRILL_LENGTH) {
        runtime.engine.append(&event)?;
    }
    let snapshot = runtime.query.export_all()?;
    let clean = verify_snapshot(&snapshot);

    let edited_store = Arc::new(InMemoryAuditStore::from_entries(edit(
        &snapshot.entries,
        TAMPERED_AT,
        false,
    )));
    let verifier = ChainVerifier::new(edited_store);
    let edited = verifier.verify_all()?;
    let edited_prefix = verifier.verify(0, TAMPERED_AT - 1)?;

    let forged = verify_snapshot(&ChainSnapshot {
        entries: edit(&snapshot.entries, TAMPERED_AT, true),
        ..snapshot.clone()
    });

    Ok(TamperSummary {
        clean,
        edited,
        edited_prefix,
        forged,
    })
}

/// Run Scenario 4: Tamper Drill.
pub fn run_scenario(config: &TamperlogConfig) -> AuditResult<()> {
    println!("=== Scenario 4: Tamper Drill ===");
    println!();

    let runtime = AuditRuntime::scratch(config);
    let summary = run(&runtime)?;
    let terminal = runtime.store.tail()?.map(|t| t.hash).unwrap_or_default();

    println!("  Chain of {} entries, terminal hash {}…", DRILL_LENGTH, short(&terminal));
    println!("  Clean export:                      {}", summary.clean.outcome);
    println!();
    println!("  Attack 1: edit new_values of entry {}, keep stored hash", TAMPERED_AT);
    println!("    verify(0..={}):                  {}", DRILL_LENGTH - 1, summary.edited.outcome);
    println!("    verify(0..={}):                  {}", TAMPERED_AT - 1, summary.edited_prefix.outcome);
    println!();
    println!("  Attack 2: edit entry {} and recompute its hash", TAMPERED_AT);
    println!("    verify(0..={}):                  {}", DRILL_LENGTH - 1, summary.forged.outcome);
    println!();
    println!("  Scenario 4 complete.");
    println!();

    Ok(())
}

//! Scenario 1: Product Lifecycle
//!
//! The catalog service creates product 42, then changes its price. The create
//! event is then delivered a second time, as an at-least-once transport will.
//!
//! Walk-through:
//!   1. Create on an empty chain → sequence 0, previous hash = genesis
//!   2. Price change → sequence 1, linked to entry 0
//!   3. Redelivered create → no new entry, stored entry 0 returned
//!   4. Verify the chain and list the newest page

use chrono::Duration;
use tokio_util::sync::CancellationToken;

use tamperlog_audit::AppendOutcome;
use tamperlog_config::TamperlogConfig;
use tamperlog_contracts::{
    entry::AuditEntry,
    error::AuditResult,
    verify::VerificationReport,
};
use tamperlog_core::traits::AuditStore;

use crate::mock_data::{catalog, price_changed, product_created, shop_epoch};
use crate::runtime::AuditRuntime;
use crate::scenarios::short;

pub struct LifecycleSummary {
    pub created: AuditEntry,
    pub modified: AuditEntry,
    pub replay: AppendOutcome,
    pub chain_length: u64,
    pub report: VerificationReport,
}

/// Run the lifecycle against `runtime`, which must start empty.
pub fn run(runtime: &AuditRuntime) -> AuditResult<LifecycleSummary> {
    let product = &catalog()[0];
    let t0 = shop_epoch();
    let create = product_created("a", product, t0);
    let reprice = price_changed("b", product, 9_900, t0 + Duration::minutes(5));

    let created = runtime.engine.append(&create)?;
    let modified = runtime.engine.append(&reprice)?;
    let replay = runtime.engine.submit(&create, &CancellationToken::new())?;

    Ok(LifecycleSummary {
        created,
        modified,
        replay,
        chain_length: runtime.store.count()?,
        report: runtime.verifier.verify(0, 1)?,
    })
}

/// Run Scenario 1: Product Lifecycle.
pub fn run_scenario(config: &TamperlogConfig) -> AuditResult<()> {
    println!("=== Scenario 1: Product Lifecycle ===");
    println!();

    let runtime = AuditRuntime::scratch(config);
    let summary = run(&runtime)?;

    println!("  [1] Product/42 Created   (dedup key \"a\")");
    print_entry(&summary.created);
    println!("  [2] Product/42 Modified  (dedup key \"b\")");
    print_entry(&summary.modified);
    println!("  [3] Product/42 Created redelivered (dedup key \"a\")");
    println!(
        "      outcome:        {}",
        if summary.replay.is_duplicate() {
            "DuplicateIgnored"
        } else {
            "Appended"
        }
    );
    println!("      stored entry:   sequence {}", summary.replay.entry().sequence);
    println!();
    println!("  Chain length:           {}", summary.chain_length);
    println!("  Chain verification:     {}", summary.report.outcome);

    let page = runtime.query.list_page(1, runtime.default_page_size)?;
    println!(
        "  Newest page:            page {} of {} ({} entr{})",
        page.page_number,
        page.total_pages(),
        page.total_count,
        if page.total_count == 1 { "y" } else { "ies" }
    );
    for entry in &page.items {
        println!(
            "    #{:<3} {:<8} {}/{}",
            entry.sequence, entry.event.action, entry.event.entity_name, entry.event.entity_id
        );
    }
    println!();
    println!("  Scenario 1 complete.");
    println!();

    Ok(())
}

fn print_entry(entry: &AuditEntry) {
    println!("      sequence:       {}", entry.sequence);
    println!("      previous hash:  {}…", short(&entry.previous_hash));
    println!("      hash:           {}…", short(&entry.hash));
}

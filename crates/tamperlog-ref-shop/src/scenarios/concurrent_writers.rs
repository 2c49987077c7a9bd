//! Scenario 3: Concurrent Writers
//!
//! Several checkout workers append distinct events at the same moment. Half of
//! them go through a second `AppendEngine` over the same store, standing in
//! for another process: those races are settled by the store's uniqueness
//! constraints instead of the in-process tail lock. The chain must come out
//! with one entry per worker, contiguous and unforked.

use std::sync::Arc;
use std::thread;

use tamperlog_audit::AppendEngine;
use tamperlog_config::TamperlogConfig;
use tamperlog_contracts::{
    error::{AuditError, AuditResult},
    retry::RetryPolicy,
    verify::VerificationReport,
};
use tamperlog_core::traits::AuditStore;

use crate::mock_data::storefront_traffic;
use crate::runtime::AuditRuntime;

pub const DEFAULT_WORKERS: usize = 16;

pub struct ConcurrentSummary {
    pub workers: usize,
    pub chain_length: u64,
    pub report: VerificationReport,
}

/// Append one distinct event per worker, all at once.
///
/// A writer only loses a race to another writer's commit, so an attempt
/// budget of `workers` always suffices; the configured budget is raised to it.
pub fn run(runtime: &AuditRuntime, workers: usize) -> AuditResult<ConcurrentSummary> {
    let base = runtime.engine.policy();
    let writers = u32::try_from(workers).unwrap_or(u32::MAX);
    let policy = RetryPolicy {
        max_append_attempts: base.max_append_attempts.max(writers),
        ..base.clone()
    };
    let engines = [
        Arc::new(AppendEngine::with_policy(Arc::clone(&runtime.store), policy.clone())),
        Arc::new(AppendEngine::with_policy(Arc::clone(&runtime.store), policy)),
    ];
    let events = storefront_traffic("checkout", workers);

    let results: Vec<AuditResult<u64>> = thread::scope(|scope| {
        let handles: Vec<_> = events
            .iter()
            .enumerate()
            .map(|(i, event)| {
                let engine = Arc::clone(&engines[i % 2]);
                scope.spawn(move || engine.append(event).map(|entry| entry.sequence))
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle.join().unwrap_or_else(|_| {
                    Err(AuditError::Storage {
                        reason: "writer thread panicked".to_string(),
                    })
                })
            })
            .collect()
    });

    for result in results {
        result?;
    }

    let chain_length = runtime.store.count()?;
    let report = if chain_length == 0 {
        runtime.verifier.verify_all()?
    } else {
        runtime.verifier.verify(0, chain_length - 1)?
    };

    Ok(ConcurrentSummary {
        workers,
        chain_length,
        report,
    })
}

/// Run Scenario 3: Concurrent Writers.
pub fn run_scenario(config: &TamperlogConfig, workers: usize) -> AuditResult<()> {
    println!("=== Scenario 3: Concurrent Writers ===");
    println!();

    let runtime = AuditRuntime::scratch(config);
    let summary = run(&runtime, workers)?;

    println!("  Writers:                {} (split across 2 engines)", summary.workers);
    println!("  Chain length:           {}", summary.chain_length);
    println!("  Entries verified:       {}", summary.report.entries_checked);
    println!("  Chain verification:     {}", summary.report.outcome);
    println!();
    println!("  Scenario 3 complete.");
    println!();

    Ok(())
}

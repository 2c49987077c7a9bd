//! Scenario 2: Redelivery Storm
//!
//! Storefront traffic is published through a broker that duplicates every
//! third publish and loses every fourth ack. Four consumers drain it. Every
//! logical event must land in the chain exactly once.

use tamperlog_config::TamperlogConfig;
use tamperlog_contracts::{error::AuditResult, verify::VerificationReport};
use tamperlog_core::traits::AuditStore;

use crate::consumer::{ConsumerPool, ConsumerReport};
use crate::delivery::{BrokerStats, InMemoryBroker};
use crate::mock_data::storefront_traffic;
use crate::runtime::AuditRuntime;

pub const STORM_EVENTS: usize = 40;
pub const STORM_WORKERS: usize = 4;

pub struct StormSummary {
    pub events: usize,
    pub consumer: ConsumerReport,
    pub broker: BrokerStats,
    pub chain_length: u64,
    pub report: VerificationReport,
}

pub fn run(runtime: &AuditRuntime, events: usize, workers: usize) -> AuditResult<StormSummary> {
    let broker = InMemoryBroker::new()
        .with_duplicate_publish(3)
        .with_ack_loss(4);
    broker.publish_all(storefront_traffic("storm", events));

    let consumer = ConsumerPool::new(runtime.engine.clone(), workers).run(&broker);

    Ok(StormSummary {
        events,
        consumer,
        broker: broker.stats(),
        chain_length: runtime.store.count()?,
        report: runtime.verifier.verify_all()?,
    })
}

/// Run Scenario 2: Redelivery Storm.
pub fn run_scenario(config: &TamperlogConfig) -> AuditResult<()> {
    println!("=== Scenario 2: Redelivery Storm ===");
    println!();

    let runtime = AuditRuntime::scratch(config);
    let summary = run(&runtime, STORM_EVENTS, STORM_WORKERS)?;

    println!("  Logical events published:   {}", summary.events);
    println!("  Duplicate publishes:        {}", summary.broker.duplicated);
    println!("  Acks lost:                  {}", summary.broker.acks_lost);
    println!("  Deliveries handed out:      {}", summary.broker.delivered);
    println!("  Consumers:                  {}", STORM_WORKERS);
    println!();
    println!("  Appended:                   {}", summary.consumer.appended);
    println!("  Duplicates ignored:         {}", summary.consumer.duplicates);
    println!("  Nacked:                     {}", summary.consumer.nacked);
    println!("  Dead-lettered:              {}", summary.consumer.dead_lettered);
    println!();
    println!(
        "  Chain length:               {} (expected {})",
        summary.chain_length, summary.events
    );
    println!("  Chain verification:         {}", summary.report.outcome);
    println!();
    println!("  Scenario 2 complete.");
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storm_collapses_to_one_entry_per_event() {
        let runtime = AuditRuntime::scratch(&TamperlogConfig::default());
        let summary = run(&runtime, 24, 3).unwrap();

        assert_eq!(summary.chain_length, 24);
        assert_eq!(summary.consumer.appended, 24);
        assert!(summary.broker.duplicated > 0);
        assert!(summary.broker.acks_lost > 0);
        assert_eq!(
            summary.consumer.duplicates,
            summary.broker.delivered - summary.consumer.appended
        );
        assert!(summary.report.is_intact());
        assert_eq!(summary.report.entries_checked, 24);
    }
}

//! A pool of worker threads draining an `InMemoryBroker` into the chain.
//!
//! Settlement rules per delivery:
//!
//! | `submit` result            | settlement    |
//! |----------------------------|---------------|
//! | `Appended`                 | ack           |
//! | `DuplicateIgnored`         | ack           |
//! | `TransientStorage`         | nack          |
//! | `Cancelled`                | nack          |
//! | `ChainConflict`, other     | dead-letter   |

use std::ops::AddAssign;
use std::sync::Arc;
use std::thread;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use tamperlog_audit::{AppendEngine, AppendOutcome};
use tamperlog_contracts::error::AuditError;

use crate::delivery::{Delivery, InMemoryBroker};

/// Per-run totals across all workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerReport {
    pub appended: u64,
    pub duplicates: u64,
    pub nacked: u64,
    pub dead_lettered: u64,
}

impl AddAssign for ConsumerReport {
    fn add_assign(&mut self, rhs: Self) {
        self.appended += rhs.appended;
        self.duplicates += rhs.duplicates;
        self.nacked += rhs.nacked;
        self.dead_lettered += rhs.dead_lettered;
    }
}

pub struct ConsumerPool {
    engine: Arc<AppendEngine>,
    workers: usize,
    cancel: CancellationToken,
}

impl ConsumerPool {
    pub fn new(engine: Arc<AppendEngine>, workers: usize) -> Self {
        Self {
            engine,
            workers: workers.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Share a token the caller can use to stop the pool mid-run.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run every worker until the broker drains or the pool is cancelled.
    pub fn run(&self, broker: &InMemoryBroker) -> ConsumerReport {
        thread::scope(|scope| {
            let handles: Vec<_> = (0..self.workers)
                .map(|worker| scope.spawn(move || self.work(worker, broker)))
                .collect();

            let mut report = ConsumerReport::default();
            for handle in handles {
                match handle.join() {
                    Ok(tally) => report += tally,
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
            report
        })
    }

    fn work(&self, worker: usize, broker: &InMemoryBroker) -> ConsumerReport {
        let mut tally = ConsumerReport::default();
        while !self.cancel.is_cancelled() {
            let Some(delivery) = broker.receive() else {
                break;
            };
            self.handle(worker, broker, &delivery, &mut tally);
        }
        debug!(worker, ?tally, "consumer worker finished");
        tally
    }

    fn handle(
        &self,
        worker: usize,
        broker: &InMemoryBroker,
        delivery: &Delivery,
        tally: &mut ConsumerReport,
    ) {
        match self.engine.submit(&delivery.event, &self.cancel) {
            Ok(AppendOutcome::Appended(entry)) => {
                debug!(worker, sequence = entry.sequence, "appended");
                tally.appended += 1;
                broker.ack(delivery);
            }
            Ok(AppendOutcome::DuplicateIgnored(entry)) => {
                debug!(worker, sequence = entry.sequence, attempt = delivery.attempt, "duplicate delivery");
                tally.duplicates += 1;
                broker.ack(delivery);
            }
            Err(e @ (AuditError::TransientStorage { .. } | AuditError::Cancelled)) => {
                warn!(worker, key = %delivery.event.dedup_key, error = %e, "delivery nacked");
                tally.nacked += 1;
                broker.nack(delivery, &e.to_string());
            }
            Err(e) => {
                error!(worker, key = %delivery.event.dedup_key, error = %e, "delivery dead-lettered");
                tally.dead_lettered += 1;
                broker.dead_letter(delivery, &e.to_string());
            }
        }
    }
}

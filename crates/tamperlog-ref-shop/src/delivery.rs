//! An at-least-once message transport, held in memory.
//!
//! `InMemoryBroker` hands out `Delivery` values. Every delivery must be
//! settled with `ack`, `nack`, or `dead_letter`. Nacked deliveries, and
//! deliveries whose ack the broker "loses", go back on the queue with the same
//! event and therefore the same `dedup_key`. Consumers that assume
//! exactly-once delivery will double-write against this broker.

use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use tamperlog_contracts::event::AuditEvent;

/// Deliveries allowed per message before it is dead-lettered on nack.
pub const DEFAULT_MAX_DELIVERIES: u32 = 16;

/// One handout of a message to a consumer.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Identifies this handout; pass it back to settle it.
    pub tag: u64,
    /// 1 on first delivery, incremented on every redelivery.
    pub attempt: u32,
    pub event: AuditEvent,
}

impl Delivery {
    pub fn is_redelivery(&self) -> bool {
        self.attempt > 1
    }
}

/// A message the broker gave up on.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub event: AuditEvent,
    pub attempts: u32,
    pub reason: String,
}

/// Running totals since the broker was created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub published: u64,
    /// Extra copies enqueued by the duplicate-publish knob.
    pub duplicated: u64,
    pub delivered: u64,
    pub redelivered: u64,
    pub acked: u64,
    /// Acks the broker dropped, forcing a redelivery.
    pub acks_lost: u64,
    pub nacked: u64,
    pub dead_lettered: u64,
}

struct Message {
    event: AuditEvent,
    attempts: u32,
}

#[derive(Default)]
struct BrokerState {
    ready: VecDeque<Message>,
    in_flight: HashMap<u64, Message>,
    dead: Vec<DeadLetter>,
    next_tag: u64,
    stats: BrokerStats,
}

pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
    changed: Condvar,
    duplicate_every: Option<u64>,
    lose_ack_every: Option<u64>,
    max_deliveries: u32,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BrokerState::default()),
            changed: Condvar::new(),
            duplicate_every: None,
            lose_ack_every: None,
            max_deliveries: DEFAULT_MAX_DELIVERIES,
        }
    }

    /// Enqueue every `n`th published message twice, as a producer that
    /// retried a publish it believed had failed would.
    pub fn with_duplicate_publish(mut self, n: u64) -> Self {
        self.duplicate_every = Some(n.max(1));
        self
    }

    /// Drop every `n`th ack, as if the consumer crashed right after writing.
    pub fn with_ack_loss(mut self, n: u64) -> Self {
        self.lose_ack_every = Some(n.max(1));
        self
    }

    pub fn with_max_deliveries(mut self, max_deliveries: u32) -> Self {
        self.max_deliveries = max_deliveries.max(1);
        self
    }

    pub fn publish(&self, event: AuditEvent) {
        let mut state = self.lock();
        state.stats.published += 1;
        if let Some(n) = self.duplicate_every {
            if state.stats.published % n == 0 {
                state.stats.duplicated += 1;
                state.ready.push_back(Message {
                    event: event.clone(),
                    attempts: 0,
                });
            }
        }
        state.ready.push_back(Message { event, attempts: 0 });
        drop(state);
        self.changed.notify_one();
    }

    pub fn publish_all(&self, events: impl IntoIterator<Item = AuditEvent>) {
        for event in events {
            self.publish(event);
        }
    }

    /// Block until a message is ready.
    ///
    /// Returns `None` once nothing is queued and nothing is in flight, which
    /// means every published message has been acked or dead-lettered.
    pub fn receive(&self) -> Option<Delivery> {
        let mut state = self.lock();
        loop {
            if let Some(mut message) = state.ready.pop_front() {
                message.attempts += 1;
                state.next_tag += 1;
                let tag = state.next_tag;
                state.stats.delivered += 1;
                if message.attempts > 1 {
                    state.stats.redelivered += 1;
                }
                let delivery = Delivery {
                    tag,
                    attempt: message.attempts,
                    event: message.event.clone(),
                };
                state.in_flight.insert(tag, message);
                return Some(delivery);
            }
            if state.in_flight.is_empty() {
                return None;
            }
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn ack(&self, delivery: &Delivery) {
        let mut state = self.lock();
        let Some(message) = state.in_flight.remove(&delivery.tag) else {
            return;
        };
        state.stats.acked += 1;
        if let Some(n) = self.lose_ack_every {
            if state.stats.acked % n == 0 {
                state.stats.acks_lost += 1;
                debug!(key = %message.event.dedup_key, "ack lost; message will be redelivered");
                state.ready.push_back(message);
            }
        }
        drop(state);
        self.changed.notify_all();
    }

    /// Return the message to the queue, or dead-letter it once it has been
    /// delivered `max_deliveries` times.
    pub fn nack(&self, delivery: &Delivery, reason: &str) {
        let mut state = self.lock();
        let Some(message) = state.in_flight.remove(&delivery.tag) else {
            return;
        };
        state.stats.nacked += 1;
        if message.attempts >= self.max_deliveries {
            Self::bury(&mut state, message, format!("delivery attempts exhausted: {}", reason));
        } else {
            state.ready.push_back(message);
        }
        drop(state);
        self.changed.notify_all();
    }

    pub fn dead_letter(&self, delivery: &Delivery, reason: &str) {
        let mut state = self.lock();
        if let Some(message) = state.in_flight.remove(&delivery.tag) {
            Self::bury(&mut state, message, reason.to_string());
        }
        drop(state);
        self.changed.notify_all();
    }

    /// Requeue everything in flight, as a visibility timeout expiring would.
    pub fn redeliver_unacked(&self) -> usize {
        let mut state = self.lock();
        let tags: Vec<u64> = state.in_flight.keys().copied().collect();
        for tag in &tags {
            if let Some(message) = state.in_flight.remove(tag) {
                state.ready.push_back(message);
            }
        }
        drop(state);
        self.changed.notify_all();
        tags.len()
    }

    pub fn stats(&self) -> BrokerStats {
        self.lock().stats.clone()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.lock().dead.clone()
    }

    /// Messages queued or in flight.
    pub fn pending(&self) -> usize {
        let state = self.lock();
        state.ready.len() + state.in_flight.len()
    }

    fn bury(state: &mut BrokerState, message: Message, reason: String) {
        warn!(
            key = %message.event.dedup_key,
            attempts = message.attempts,
            reason = %reason,
            "message dead-lettered"
        );
        state.stats.dead_lettered += 1;
        state.dead.push(DeadLetter {
            event: message.event,
            attempts: message.attempts,
            reason,
        });
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_data::storefront_traffic;

    #[test]
    fn test_ack_settles_message() {
        let broker = InMemoryBroker::new();
        broker.publish_all(storefront_traffic("a", 2));

        let first = broker.receive().unwrap();
        broker.ack(&first);
        let second = broker.receive().unwrap();
        broker.ack(&second);

        assert!(broker.receive().is_none());
        assert_eq!(broker.stats().acked, 2);
        assert_eq!(broker.pending(), 0);
    }

    #[test]
    fn test_nack_redelivers_same_key() {
        let broker = InMemoryBroker::new();
        broker.publish_all(storefront_traffic("n", 1));

        let first = broker.receive().unwrap();
        broker.nack(&first, "store busy");
        let again = broker.receive().unwrap();

        assert_eq!(again.event.dedup_key, first.event.dedup_key);
        assert_eq!(again.attempt, 2);
        assert!(again.is_redelivery());
        assert_ne!(again.tag, first.tag);
    }

    #[test]
    fn test_nack_dead_letters_after_max_deliveries() {
        let broker = InMemoryBroker::new().with_max_deliveries(2);
        broker.publish_all(storefront_traffic("m", 1));

        let d = broker.receive().unwrap();
        broker.nack(&d, "busy");
        let d = broker.receive().unwrap();
        broker.nack(&d, "busy");

        assert!(broker.receive().is_none());
        let dead = broker.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 2);
        assert!(dead[0].reason.contains("exhausted"));
    }

    #[test]
    fn test_duplicate_publish_enqueues_copy() {
        let broker = InMemoryBroker::new().with_duplicate_publish(2);
        broker.publish_all(storefront_traffic("d", 4));

        let stats = broker.stats();
        assert_eq!(stats.published, 4);
        assert_eq!(stats.duplicated, 2);
        assert_eq!(broker.pending(), 6);
    }

    #[test]
    fn test_lost_ack_redelivers() {
        let broker = InMemoryBroker::new().with_ack_loss(1);
        broker.publish_all(storefront_traffic("l", 1));

        let first = broker.receive().unwrap();
        broker.ack(&first);
        let again = broker.receive().unwrap();

        assert_eq!(again.event.dedup_key, first.event.dedup_key);
        assert_eq!(broker.stats().acks_lost, 1);
    }

    #[test]
    fn test_redeliver_unacked_requeues_in_flight() {
        let broker = InMemoryBroker::new();
        broker.publish_all(storefront_traffic("u", 3));
        let _a = broker.receive().unwrap();
        let _b = broker.receive().unwrap();

        assert_eq!(broker.redeliver_unacked(), 2);
        assert_eq!(broker.pending(), 3);
    }

    #[test]
    fn test_settling_unknown_tag_is_ignored() {
        let broker = InMemoryBroker::new();
        broker.publish_all(storefront_traffic("x", 1));
        let d = broker.receive().unwrap();
        broker.ack(&d);
        broker.ack(&d);
        broker.nack(&d, "late");
        assert_eq!(broker.stats().acked, 1);
        assert_eq!(broker.stats().nacked, 0);
    }
}

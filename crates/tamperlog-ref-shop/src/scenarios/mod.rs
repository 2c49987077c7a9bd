//! Shop reference scenarios.
//!
//! Each scenario wires a fresh in-memory chain from the supplied
//! configuration and demonstrates one property of the audit chain.

pub mod concurrent_writers;
pub mod product_lifecycle;
pub mod redelivery;
pub mod tamper_drill;

/// Render the first eight hex characters of a hash for display.
pub(crate) fn short(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}

//! # tamperlog-audit
//!
//! Append-only, SHA-256 hash-chained audit trail.
//!
//! ## Overview
//!
//! Every delivered `AuditEvent` is canonically encoded, linked to the current
//! chain tail, and committed as an `AuditEntry` by the [`AppendEngine`].
//! Redeliveries of the same `dedup_key` collapse into the entry committed
//! first. Tampering with any committed entry breaks its hash, which the
//! verifier in `tamperlog-verify` detects.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tamperlog_audit::{AppendEngine, AuditQuery, InMemoryAuditStore};
//!
//! let store = Arc::new(InMemoryAuditStore::new());
//! let engine = AppendEngine::new(store.clone());
//! engine.append(&event)?;
//!
//! let page = AuditQuery::new(store).list_page(1, 10)?;
//! ```

pub mod canonical;
pub mod chain;
pub mod engine;
pub mod memory;
pub mod query;
pub mod sqlite;

pub use canonical::{canonical_timestamp, encode};
pub use chain::{hash_entry, recompute, seal};
pub use engine::{AppendEngine, AppendOutcome};
pub use memory::InMemoryAuditStore;
pub use query::AuditQuery;
pub use sqlite::SqliteAuditStore;

// ── Tests ─────────────────────────────────────────────────────────────────────

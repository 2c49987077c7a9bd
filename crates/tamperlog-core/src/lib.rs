//! # tamperlog-core
//!
//! The storage contract every tamperlog component is written against.
//!
//! The append engine, verifier, and query facade never talk to a database
//! directly. They share one `AuditStore` and rely only on what the trait
//! promises: unique-constraint-enforced inserts and ordered range reads.

pub mod traits;

pub use traits::{AuditStore, EntrySlice};

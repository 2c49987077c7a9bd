//! Canonical encoding of chain entries.
//!
//! The byte layout below is an external contract: stored hashes were
//! computed over it, so fields may only ever be appended, never inserted or
//! reordered.
//!
//! Layout, in order:
//!   1. `sequence` as 8-byte big-endian
//!   2. each event field as a tagged value:
//!      - absent: the single byte `0x00`
//!      - present: `0x01`, then the UTF-8 length as 4-byte big-endian, then
//!        the UTF-8 bytes
//!
//! Event field order: dedup_key, entity_name, action, entity_id, old_values,
//! new_values, user_id, user_email, occurred_at, correlation_id, remote_ip,
//! user_agent.
//!
//! Length prefixes make separators unnecessary, so no field value can be
//! confused with its neighbours, and `None` never encodes like `Some("")`.

use chrono::{DateTime, SecondsFormat, Utc};

use tamperlog_contracts::{entry::AuditEntry, event::AuditEvent};

const ABSENT: u8 = 0x00;
const PRESENT: u8 = 0x01;

/// Render a timestamp the one way it is ever hashed or stored:
/// RFC 3339, UTC, nanosecond precision, `Z` suffix.
pub fn canonical_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Encode the hashed fields of an entry at `sequence` carrying `event`.
pub fn encode(sequence: u64, event: &AuditEvent) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);
    buf.extend_from_slice(&sequence.to_be_bytes());

    put(&mut buf, Some(event.dedup_key.as_str()));
    put(&mut buf, Some(&event.entity_name));
    put(&mut buf, Some(event.action.as_str()));
    put(&mut buf, Some(&event.entity_id));
    put(&mut buf, event.old_values.as_deref());
    put(&mut buf, event.new_values.as_deref());
    put(&mut buf, event.user_id.as_deref());
    put(&mut buf, event.user_email.as_deref());
    put(&mut buf, Some(&canonical_timestamp(&event.occurred_at)));
    put(&mut buf, event.correlation_id.as_deref());
    put(&mut buf, event.remote_ip.as_deref());
    put(&mut buf, event.user_agent.as_deref());

    buf
}

/// Encode a stored entry. Hashes are not part of the encoding.
pub fn encode_entry(entry: &AuditEntry) -> Vec<u8> {
    encode(entry.sequence, &entry.event)
}

fn put(buf: &mut Vec<u8>, field: Option<&str>) {
    match field {
        None => buf.push(ABSENT),
        Some(value) => {
            buf.push(PRESENT);
            // Field values are far below 4 GiB; saturate rather than wrap.
            let len = u32::try_from(value.len()).unwrap_or(u32::MAX);
            buf.extend_from_slice(&len.to_be_bytes());
            buf.extend_from_slice(value.as_bytes());
        }
    }
}

//! Canonical event encoding and hash-chain verification.
//!
//! Pure functions over `&[Event]`/`&Event`, no I/O — grounded in the
//! `integrity.rs` pathology-checking style (explicit policy enum,
//! deterministic counters, halt-vs-continue decisions made by the caller)
//! generalized from streaming market data to an append-only ledger.

use crate::canonical::{canonicalize, sha256_hex, GENESIS};
use crate::events::{Event, EventPayload, SeqNo};
use serde::Serialize;
use serde_json::Value;

/// Build the canonical JSON of `{instanceId, eventType, seqNo, prevHash,
/// timestamp, ...payload}` — the exact bytes that get hashed to produce
/// `eventHash`. `eventHash` itself is never part of this object.
pub fn build_canonical_event(
    instance_id: &str,
    seq_no: SeqNo,
    prev_hash: &str,
    timestamp: i64,
    payload: &EventPayload,
) -> String {
    let mut obj = match serde_json::to_value(payload).expect("EventPayload always serializes") {
        Value::Object(map) => map,
        _ => unreachable!("EventPayload always serializes to an object"),
    };
    obj.insert("instanceId".into(), Value::String(instance_id.to_string()));
    obj.insert("seqNo".into(), Value::Number(seq_no.into()));
    obj.insert("prevHash".into(), Value::String(prev_hash.to_string()));
    obj.insert("timestamp".into(), Value::Number(timestamp.into()));
    canonicalize(&Value::Object(obj))
}

pub fn compute_event_hash(
    instance_id: &str,
    seq_no: SeqNo,
    prev_hash: &str,
    timestamp: i64,
    payload: &EventPayload,
) -> String {
    sha256_hex(&build_canonical_event(instance_id, seq_no, prev_hash, timestamp, payload))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChainError {
    SeqGap,
    PrevHashMismatch,
    EventHashMismatch,
}

impl std::fmt::Display for ChainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChainError::SeqGap => "SeqGap",
            ChainError::PrevHashMismatch => "PrevHashMismatch",
            ChainError::EventHashMismatch => "EventHashMismatch",
        };
        f.write_str(s)
    }
}

/// Verify a single event against the last-known chain tip. Idempotent
/// resubmission (same `seqNo` already stored, matching `eventHash`) is a
/// caller-level concern; this function only ever validates the next link.
pub fn verify_single_event(
    e: &Event,
    instance_id: &str,
    last_seq_no: SeqNo,
    last_event_hash: &str,
) -> Result<(), ChainError> {
    if e.seq_no != last_seq_no + 1 {
        return Err(ChainError::SeqGap);
    }
    if e.prev_hash != last_event_hash {
        return Err(ChainError::PrevHashMismatch);
    }
    let recomputed = compute_event_hash(instance_id, e.seq_no, &e.prev_hash, e.timestamp, &e.payload);
    if recomputed != e.event_hash {
        return Err(ChainError::EventHashMismatch);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainVerification {
    pub valid: bool,
    pub chain_length: u64,
    pub break_at_seq_no: Option<SeqNo>,
    pub error: Option<ChainError>,
    pub first_event_hash: Option<String>,
    pub last_event_hash: Option<String>,
}

/// Walk `events` (must already be sorted by `seqNo` ascending) from
/// `expectedSeqNo = 1`, `expectedPrevHash = GENESIS`.
pub fn verify_chain(events: &[Event], instance_id: &str) -> ChainVerification {
    if events.is_empty() {
        return ChainVerification {
            valid: true,
            chain_length: 0,
            break_at_seq_no: None,
            error: None,
            first_event_hash: None,
            last_event_hash: None,
        };
    }

    let mut expected_seq_no: SeqNo = 1;
    let mut expected_prev_hash = GENESIS.to_string();

    for e in events {
        if let Err(err) = verify_single_event(e, instance_id, expected_seq_no - 1, &expected_prev_hash) {
            return ChainVerification {
                valid: false,
                chain_length: expected_seq_no - 1,
                break_at_seq_no: Some(e.seq_no),
                error: Some(err),
                first_event_hash: events.first().map(|e| e.event_hash.clone()),
                last_event_hash: None,
            };
        }
        expected_seq_no = e.seq_no + 1;
        expected_prev_hash = e.event_hash.clone();
    }

    ChainVerification {
        valid: true,
        chain_length: events.len() as u64,
        break_at_seq_no: None,
        error: None,
        first_event_hash: events.first().map(|e| e.event_hash.clone()),
        last_event_hash: events.last().map(|e| e.event_hash.clone()),
    }
}

//! Transactional ingest path: validate, chain-link, persist, and trigger
//! checkpoints/commitments — one event at a time, one instance at a time.
//!
//! Grounded in `backtest_v2::ledger::apply_entry`'s shape: snapshot the
//! state the new entry depends on, apply it, check invariants, and roll
//! back on violation. Here the "rollback" is simply letting the SQLite
//! transaction drop without a commit — [`crate::store::Store::transact`]
//! never calls `commit()` unless the closure returns `Ok`.
//!
//! Concurrency is a `parking_lot::Mutex`-guarded per-instance lock map:
//! ingesting for instance A never blocks on an in-flight ingest for
//! instance B, but two concurrent ingests for the *same* instance can't
//! race each other into the replay/checkpoint logic below. A caller that
//! loses the race gets [`IngestError::InstanceLocked`] rather than
//! blocking, since a retry is always safe (ingest is idempotent).

use crate::canonical::GENESIS;
use crate::chain::{compute_event_hash, verify_single_event, ChainError};
use crate::checkpoint::{compute_state_hmac, make_checkpoint, should_create_checkpoint, Checkpoint};
use crate::commitments::{make_commitment, should_create_commitment, Commitment};
use crate::error::IngestError;
use crate::events::{Event, SeqNo};
use crate::replay::replay_all;
use crate::store::Store;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

pub struct StateManager {
    store: Arc<Store>,
    server_hmac_secret: Vec<u8>,
    instance_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new event was appended at this seqNo.
    Appended { seq_no: SeqNo, checkpoint_created: bool, commitment_created: bool },
    /// The same seqNo with the same eventHash was already recorded; the
    /// resubmission is a no-op, not an error.
    AlreadyRecorded { seq_no: SeqNo },
}

impl StateManager {
    pub fn new(store: Arc<Store>, server_hmac_secret: Vec<u8>) -> Self {
        Self { store, server_hmac_secret, instance_locks: Mutex::new(HashMap::new()) }
    }

    /// Fetch (or create) the lock guarding ingest for one instance. The
    /// registry mutex is only ever held long enough to look up or insert
    /// an entry, never across the ingest itself.
    fn instance_lock(&self, instance_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.instance_locks.lock();
        locks.entry(instance_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Append one fully-formed, self-hashed event to an instance's
    /// ledger. `event.instance_id` determines which ledger; `event.seq_no`
    /// and `event.prev_hash` are validated against the stored chain tip,
    /// not trusted blindly.
    pub fn ingest_event(&self, event: Event) -> Result<IngestOutcome, IngestError> {
        event.validate_shape().map_err(IngestError::SchemaInvalid)?;

        let instance_id = event.instance_id.clone();
        let secret = self.server_hmac_secret.clone();

        let lock = self.instance_lock(&instance_id);
        let _guard = lock.try_lock().ok_or(IngestError::InstanceLocked)?;

        self.store
            .transact(|tx| {
                if let Some(existing) = Store::find_event(tx, &instance_id, event.seq_no)? {
                    if existing.event_hash == event.event_hash {
                        return Ok(IngestOutcome::AlreadyRecorded { seq_no: event.seq_no });
                    }
                    return Err(anyhow::Error::new(IngestError::ConflictingEvent { seq_no: event.seq_no }));
                }

                let (last_seq_no, last_hash) =
                    Store::last_event(tx, &instance_id)?.unwrap_or((0, GENESIS.to_string()));

                verify_single_event(&event, &instance_id, last_seq_no, &last_hash).map_err(|reason| {
                    anyhow::Error::new(IngestError::ChainBroken { seq_no: event.seq_no, reason })
                })?;

                let recomputed =
                    compute_event_hash(&instance_id, event.seq_no, &event.prev_hash, event.timestamp, &event.payload);
                if recomputed != event.event_hash {
                    return Err(anyhow::Error::new(IngestError::ChainBroken {
                        seq_no: event.seq_no,
                        reason: ChainError::EventHashMismatch,
                    }));
                }

                Store::insert_event(tx, &event)?;

                let all_events = {
                    let mut events = Vec::new();
                    let mut seq = 1u64;
                    while let Some(e) = Store::find_event(tx, &instance_id, seq)? {
                        events.push(e);
                        seq += 1;
                    }
                    events
                };
                let state = replay_all(&all_events);

                let mut checkpoint_created = false;
                if should_create_checkpoint(event.seq_no) {
                    let cp: Checkpoint = make_checkpoint(
                        &instance_id,
                        event.seq_no,
                        &secret,
                        state.balance,
                        state.equity,
                        state.high_water_mark,
                    );
                    Store::insert_checkpoint(tx, &cp)?;
                    checkpoint_created = true;
                }

                let mut commitment_created = false;
                if should_create_commitment(event.seq_no) {
                    let state_hmac =
                        compute_state_hmac(&secret, state.balance, state.equity, state.high_water_mark);
                    let commitment: Commitment =
                        make_commitment(&instance_id, event.seq_no, &event.event_hash, &state_hmac);
                    Store::insert_commitment(tx, &commitment)?;
                    commitment_created = true;
                }

                Ok(IngestOutcome::Appended { seq_no: event.seq_no, checkpoint_created, commitment_created })
            })
            .map_err(|e| match e.downcast::<IngestError>() {
                Ok(ingest_err) => ingest_err,
                Err(other) => IngestError::Storage(other.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Cents;
    use crate::events::{EventPayload, SessionMode};

    fn start_event(instance_id: &str) -> Event {
        let payload = EventPayload::SessionStart {
            broker: "IC Markets".into(),
            account: "1".into(),
            symbol: "EURUSD".into(),
            timeframe: "M15".into(),
            ea_version: "1.0".into(),
            mode: SessionMode::Paper,
            balance: Cents::from_f64(10000.0),
        };
        let hash = compute_event_hash(instance_id, 1, GENESIS, 1_700_000_000, &payload);
        Event {
            instance_id: instance_id.to_string(),
            seq_no: 1,
            prev_hash: GENESIS.to_string(),
            event_hash: hash,
            timestamp: 1_700_000_000,
            payload,
        }
    }

    fn manager() -> StateManager {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::new(dir.path().join("t.db").to_str().unwrap()).unwrap());
        StateManager::new(store, b"test-secret".to_vec())
    }

    #[test]
    fn first_event_appends_at_seq_one() {
        let mgr = manager();
        let outcome = mgr.ingest_event(start_event("inst-a")).unwrap();
        assert_eq!(outcome, IngestOutcome::Appended { seq_no: 1, checkpoint_created: false, commitment_created: false });
    }

    #[test]
    fn resubmitting_identical_event_is_a_no_op() {
        let mgr = manager();
        let e = start_event("inst-b");
        mgr.ingest_event(e.clone()).unwrap();
        let outcome = mgr.ingest_event(e).unwrap();
        assert_eq!(outcome, IngestOutcome::AlreadyRecorded { seq_no: 1 });
    }

    #[test]
    fn resubmitting_same_seq_no_with_different_hash_conflicts() {
        let mgr = manager();
        let e = start_event("inst-c");
        mgr.ingest_event(e.clone()).unwrap();
        let mut tampered = e;
        tampered.event_hash = "f".repeat(64);
        let result = mgr.ingest_event(tampered);
        assert!(matches!(result, Err(IngestError::ConflictingEvent { seq_no: 1 })));
    }

    #[test]
    fn out_of_order_seq_no_is_rejected() {
        let mgr = manager();
        let mut e = start_event("inst-d");
        e.seq_no = 5;
        let result = mgr.ingest_event(e);
        assert!(matches!(result, Err(IngestError::ChainBroken { seq_no: 5, .. })));
    }

    #[test]
    fn checkpoint_is_created_at_interval_boundary() {
        let mgr = manager();
        let instance_id = "inst-checkpoint";
        let mut prev = GENESIS.to_string();
        let mut ts = 1_700_000_000i64;
        for seq in 1..=100u64 {
            let payload = if seq == 1 {
                EventPayload::SessionStart {
                    broker: "IC Markets".into(),
                    account: "1".into(),
                    symbol: "EURUSD".into(),
                    timeframe: "M15".into(),
                    ea_version: "1.0".into(),
                    mode: SessionMode::Paper,
                    balance: Cents::from_f64(10000.0),
                }
            } else {
                EventPayload::Cashflow {
                    kind: crate::events::CashflowKind::Deposit,
                    amount: Cents::from_f64(1.0),
                    balance_before: Cents::ZERO,
                    balance_after: Cents::ZERO,
                    note: "noise".into(),
                }
            };
            let hash = compute_event_hash(instance_id, seq, &prev, ts, &payload);
            let event = Event {
                instance_id: instance_id.to_string(),
                seq_no: seq,
                prev_hash: prev.clone(),
                event_hash: hash.clone(),
                timestamp: ts,
                payload,
            };
            let outcome = mgr.ingest_event(event).unwrap();
            if seq == 100 {
                assert_eq!(
                    outcome,
                    IngestOutcome::Appended { seq_no: 100, checkpoint_created: true, commitment_created: false }
                );
            }
            prev = hash;
            ts += 60;
        }
    }
}

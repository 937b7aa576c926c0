//! Full pipeline: ingest → replay → report → bundle → verify, plus the
//! tamper/reorder/idempotency scenarios an investor-facing ledger must
//! reject or absorb correctly.

use std::sync::Arc;
use trackrecord::bundle::assemble_proof_bundle;
use trackrecord::canonical::GENESIS;
use trackrecord::chain::compute_event_hash;
use trackrecord::decimal::{Cents, Lots, Price};
use trackrecord::error::IngestError;
use trackrecord::events::{CashflowKind, Direction, Event, EventPayload, SessionMode};
use trackrecord::report::generate_report;
use trackrecord::signer::KeyPair;
use trackrecord::state_manager::{IngestOutcome, StateManager};
use trackrecord::store::Store;
use trackrecord::verify::verify_bundle;

struct Ledger {
    manager: StateManager,
    store: Arc<Store>,
    instance_id: String,
    prev_hash: String,
    seq: u64,
    ts: i64,
}

impl Ledger {
    fn new(instance_id: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::new(dir.path().join("ledger.db").to_str().unwrap()).unwrap());
        let manager = StateManager::new(store.clone(), b"integration-test-secret".to_vec());
        Self { manager, store, instance_id: instance_id.to_string(), prev_hash: GENESIS.to_string(), seq: 1, ts: 1_700_000_000 }
    }

    fn push(&mut self, payload: EventPayload) -> IngestOutcome {
        let hash = compute_event_hash(&self.instance_id, self.seq, &self.prev_hash, self.ts, &payload);
        let event = Event {
            instance_id: self.instance_id.clone(),
            seq_no: self.seq,
            prev_hash: self.prev_hash.clone(),
            event_hash: hash.clone(),
            timestamp: self.ts,
            payload,
        };
        let outcome = self.manager.ingest_event(event).expect("ingest should succeed");
        self.prev_hash = hash;
        self.seq += 1;
        self.ts += 60;
        outcome
    }

    fn push_worked_example(&mut self) {
        self.push(EventPayload::SessionStart {
            broker: "IC Markets".into(),
            account: "1".into(),
            symbol: "EURUSD".into(),
            timeframe: "M15".into(),
            ea_version: "1.0".into(),
            mode: SessionMode::Live,
            balance: Cents::from_f64(10000.0),
        });
        self.push(EventPayload::Snapshot {
            balance: Cents::from_f64(10000.0),
            equity: Cents::from_f64(10000.0),
            open_trades: 0,
            unrealized_pn_l: Cents::ZERO,
            drawdown: Cents::ZERO,
        });
        self.push(EventPayload::TradeOpen {
            ticket: 1,
            symbol: "EURUSD".into(),
            direction: Direction::Buy,
            lots: Lots::from_f64(0.10),
            open_price: Price::from_f64(1.085),
            sl: None,
            tp: None,
        });
        self.push(EventPayload::TradeClose {
            ticket: 1,
            close_price: Price::from_f64(1.0875),
            profit: Cents::from_f64(25.00),
            swap: Cents::from_f64(-1.20),
            commission: Cents::from_f64(-3.50),
            close_reason: "manual".into(),
        });
        self.push(EventPayload::Cashflow {
            kind: CashflowKind::Deposit,
            amount: Cents::from_f64(5000.0),
            balance_before: Cents::from_f64(10020.30),
            balance_after: Cents::from_f64(15020.30),
            note: "wire".into(),
        });
        self.push(EventPayload::TradeOpen {
            ticket: 2,
            symbol: "GBPUSD".into(),
            direction: Direction::Buy,
            lots: Lots::from_f64(0.20),
            open_price: Price::from_f64(1.26),
            sl: None,
            tp: None,
        });
        self.push(EventPayload::TradeClose {
            ticket: 2,
            close_price: Price::from_f64(1.25),
            profit: Cents::from_f64(-200.00),
            swap: Cents::from_f64(-2.50),
            commission: Cents::from_f64(-7.00),
            close_reason: "manual".into(),
        });
    }
}

#[test]
fn worked_example_round_trips_through_report_and_bundle() {
    let mut ledger = Ledger::new("pipeline-worked-example");
    ledger.push_worked_example();

    let events = ledger.store.load_events(&ledger.instance_id).unwrap();
    assert_eq!(events.len(), 7);

    let keys = KeyPair::generate();
    let report = generate_report(&ledger.instance_id, &events, &keys, "r1".into(), chrono::Utc::now());
    assert_eq!(report.body.statistics.longest_win_streak, 1);
    assert!(report.body.audit.chain_verified);

    let checkpoints = ledger.store.load_checkpoints(&ledger.instance_id).unwrap();
    let bundle =
        assemble_proof_bundle(&ledger.instance_id, &events, &checkpoints, &keys, "r2".into(), chrono::Utc::now(), &[]);

    let verification = verify_bundle(&bundle);
    assert!(verification.verified);
}

#[test]
fn resubmitting_the_exact_same_event_is_idempotent() {
    let mut ledger = Ledger::new("idempotent-retry");
    let payload = EventPayload::SessionStart {
        broker: "IC Markets".into(),
        account: "1".into(),
        symbol: "EURUSD".into(),
        timeframe: "M15".into(),
        ea_version: "1.0".into(),
        mode: SessionMode::Paper,
        balance: Cents::from_f64(1000.0),
    };
    let hash = compute_event_hash(&ledger.instance_id, 1, GENESIS, ledger.ts, &payload);
    let event = Event {
        instance_id: ledger.instance_id.clone(),
        seq_no: 1,
        prev_hash: GENESIS.to_string(),
        event_hash: hash,
        timestamp: ledger.ts,
        payload,
    };
    let first = ledger.manager.ingest_event(event.clone()).unwrap();
    let second = ledger.manager.ingest_event(event).unwrap();
    assert!(matches!(first, IngestOutcome::Appended { seq_no: 1, .. }));
    assert_eq!(second, IngestOutcome::AlreadyRecorded { seq_no: 1 });
    assert_eq!(ledger.store.load_events(&ledger.instance_id).unwrap().len(), 1);
}

#[test]
fn conflicting_resubmission_at_same_seq_no_is_rejected() {
    let mut ledger = Ledger::new("conflicting-retry");
    ledger.push(EventPayload::SessionStart {
        broker: "IC Markets".into(),
        account: "1".into(),
        symbol: "EURUSD".into(),
        timeframe: "M15".into(),
        ea_version: "1.0".into(),
        mode: SessionMode::Paper,
        balance: Cents::from_f64(1000.0),
    });

    let conflicting_payload = EventPayload::SessionStart {
        broker: "Different Broker".into(),
        account: "2".into(),
        symbol: "GBPUSD".into(),
        timeframe: "H1".into(),
        ea_version: "2.0".into(),
        mode: SessionMode::Live,
        balance: Cents::from_f64(2000.0),
    };
    let hash = compute_event_hash(&ledger.instance_id, 1, GENESIS, 1_700_000_000, &conflicting_payload);
    let conflicting_event = Event {
        instance_id: ledger.instance_id.clone(),
        seq_no: 1,
        prev_hash: GENESIS.to_string(),
        event_hash: hash,
        timestamp: 1_700_000_000,
        payload: conflicting_payload,
    };
    let result = ledger.manager.ingest_event(conflicting_event);
    assert!(matches!(result, Err(IngestError::ConflictingEvent { seq_no: 1 })));
}

#[test]
fn tampered_ledger_root_fails_bundle_verification() {
    let mut ledger = Ledger::new("tamper-test");
    ledger.push_worked_example();
    let mut events = ledger.store.load_events(&ledger.instance_id).unwrap();

    let keys = KeyPair::generate();
    let mut bundle =
        assemble_proof_bundle(&ledger.instance_id, &events, &[], &keys, "r1".into(), chrono::Utc::now(), &[]);

    events[2].event_hash = "f".repeat(64);
    bundle.events = events;

    let verification = verify_bundle(&bundle);
    assert!(!verification.l1.chain_ok);
    assert!(!verification.verified);
}

#[test]
fn empty_instance_has_a_vacuously_valid_chain() {
    let ledger = Ledger::new("never-traded");
    let events = ledger.store.load_events(&ledger.instance_id).unwrap();
    assert!(events.is_empty());
    let chain = trackrecord::chain::verify_chain(&events, &ledger.instance_id);
    assert!(chain.valid);
    assert_eq!(chain.chain_length, 0);
}

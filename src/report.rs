//! Report generation: replay → statistics → canonical body → signed manifest.
//!
//! Grounded in `metrics.rs`'s `BacktestReport` — one struct aggregating
//! curve, trades and stats — extended with the audit block this ledger's
//! investor-facing report requires.

use crate::canonical::canonicalize;
use crate::chain::verify_chain;
use crate::events::Event;
use crate::manifest::{build_manifest, compute_ledger_root_hash, Manifest};
use crate::metrics::{compute_statistics, Statistics};
use crate::replay::{daily_twr, replay_all, BalancePoint, ClosedTrade, DrawdownPoint, EquityPoint};
use crate::signer::KeyPair;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationLevel {
    L0None,
    L1Ledger,
    L2Broker,
    L3Notarized,
}

impl VerificationLevel {
    pub fn investor_label(self) -> &'static str {
        match self {
            VerificationLevel::L0None => "Unverified",
            VerificationLevel::L1Ledger => "Self-reported, integrity-verified",
            VerificationLevel::L2Broker => "Broker-corroborated",
            VerificationLevel::L3Notarized => "Externally timestamped",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyReturn {
    pub date: String,
    pub start_equity: crate::decimal::Cents,
    pub end_equity: crate::decimal::Cents,
    pub cashflow: crate::decimal::Cents,
    pub twr: crate::decimal::Ratio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Audit {
    pub chain_verified: bool,
    pub broker_evidence_count: u32,
    pub broker_history_digest_count: u32,
    pub chain_recovery_count: u32,
    pub verification_level: VerificationLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportBody {
    pub instance_id: String,
    pub equity_curve: Vec<EquityPoint>,
    pub balance_curve: Vec<BalancePoint>,
    pub drawdown_series: Vec<DrawdownPoint>,
    pub trades: Vec<ClosedTrade>,
    pub daily_returns: Vec<DailyReturn>,
    pub statistics: Statistics,
    pub audit: Audit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestorReport {
    pub body: ReportBody,
    pub manifest: Manifest,
}

/// Build the full signed investor report from an event range.
#[allow(clippy::too_many_arguments)]
pub fn generate_report(
    instance_id: &str,
    events: &[Event],
    keys: &KeyPair,
    report_id: String,
    generated_at: DateTime<Utc>,
) -> InvestorReport {
    let chain_result = verify_chain(events, instance_id);
    let state = replay_all(events);

    let daily_returns: Vec<DailyReturn> = state
        .daily_equity
        .iter()
        .map(|(date, day)| DailyReturn {
            date: date.clone(),
            start_equity: day.start_equity,
            end_equity: day.end_equity,
            cashflow: day.cashflow,
            twr: daily_twr(day),
        })
        .collect();

    let statistics = compute_statistics(
        &state.closed_trades,
        state.max_drawdown,
        state.balance - state.cumulative_cashflow,
    );

    let verification_level = if state.broker_evidence_count > 0 || state.broker_history_digest_count > 0 {
        VerificationLevel::L2Broker
    } else if chain_result.valid {
        VerificationLevel::L1Ledger
    } else {
        VerificationLevel::L0None
    };

    let audit = Audit {
        chain_verified: chain_result.valid,
        broker_evidence_count: state.broker_evidence_count,
        broker_history_digest_count: state.broker_history_digest_count,
        chain_recovery_count: state.chain_recovery_count,
        verification_level,
    };

    let body = ReportBody {
        instance_id: instance_id.to_string(),
        equity_curve: state.equity_curve.clone(),
        balance_curve: state.balance_curve.clone(),
        drawdown_series: state.drawdown_series.clone(),
        trades: state.closed_trades.clone(),
        daily_returns,
        statistics,
        audit,
    };

    let body_value = serde_json::to_value(&body).expect("ReportBody always serializes");
    let body_canonical = canonicalize(&body_value);

    let event_hashes: Vec<String> = events.iter().map(|e| e.event_hash.clone()).collect();
    let ledger_root_hash = compute_ledger_root_hash(&event_hashes);

    let manifest = build_manifest(
        keys,
        report_id,
        instance_id.to_string(),
        events.first().map(|e| e.seq_no),
        events.last().map(|e| e.seq_no),
        events.first().map(|e| e.timestamp),
        events.last().map(|e| e.timestamp),
        events.first().map(|e| e.event_hash.clone()),
        events.last().map(|e| e.event_hash.clone()),
        ledger_root_hash,
        &body_canonical,
        generated_at,
    );

    InvestorReport { body, manifest }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::compute_event_hash;
    use crate::decimal::Cents;
    use crate::events::{Event, EventPayload, SessionMode};

    #[test]
    fn report_body_hash_is_deterministic_across_runs() {
        let instance_id = "report-test";
        let payload = EventPayload::SessionStart {
            broker: "IC Markets".into(),
            account: "1".into(),
            symbol: "EURUSD".into(),
            timeframe: "M15".into(),
            ea_version: "1.0".into(),
            mode: SessionMode::Live,
            balance: Cents::from_f64(10000.0),
        };
        let hash = compute_event_hash(instance_id, 1, crate::canonical::GENESIS, 1_700_000_000, &payload);
        let events = vec![Event {
            instance_id: instance_id.to_string(),
            seq_no: 1,
            prev_hash: crate::canonical::GENESIS.to_string(),
            event_hash: hash,
            timestamp: 1_700_000_000,
            payload,
        }];
        let keys = KeyPair::generate();
        let now = Utc::now();
        let r1 = generate_report(instance_id, &events, &keys, "r1".into(), now);
        let r2 = generate_report(instance_id, &events, &keys, "r2".into(), now);
        assert_eq!(r1.manifest.report_body_hash, r2.manifest.report_body_hash);
    }

    #[test]
    fn empty_event_list_is_vacuously_chain_valid_and_ledger_level() {
        let keys = KeyPair::generate();
        let report = generate_report("empty-instance", &[], &keys, "r1".into(), Utc::now());
        assert!(report.body.audit.chain_verified);
        assert_eq!(report.body.audit.verification_level, VerificationLevel::L1Ledger);
    }
}

//! Standalone, database-free, multi-level proof-bundle verifier.
//!
//! Grounded in `reproducibility.rs`'s two-run fingerprint comparison,
//! specialized to a single offline bundle (replay once, compare against
//! the embedded report), and in `trust_gate.rs`'s pattern of folding
//! several machine-checkable gates into one investor-facing label.

use crate::bundle::ProofBundle;
use crate::canonical::{canonicalize, sha256_hex, GENESIS};
use crate::chain::compute_event_hash;
use crate::commitments::verify_commitment;
use crate::events::EventPayload;
use crate::report::VerificationLevel;
use crate::replay::replay_all;
use crate::signer::{verify_report_signature, SignatureVerifyError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Level1Result {
    pub chain_ok: bool,
    pub signature_ok: bool,
    pub ledger_root_ok: bool,
    pub body_hash_ok: bool,
    pub reproducible: bool,
    pub checkpoints_ok: bool,
    pub errors: Vec<String>,
    pub caveats: Vec<String>,
}

impl Level1Result {
    fn all_good(&self) -> bool {
        self.chain_ok
            && self.signature_ok
            && self.ledger_root_ok
            && self.body_hash_ok
            && self.reproducible
            && self.checkpoints_ok
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Level2Result {
    pub matched: u32,
    pub mismatched: u32,
    pub digest_valid: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Level3Result {
    pub commitments_ok: bool,
    pub notarized: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub level: VerificationLevel,
    pub l1: Level1Result,
    pub l2: Option<Level2Result>,
    pub l3: Option<Level3Result>,
    pub verified: bool,
    pub summary: String,
}

fn verify_level1(bundle: &ProofBundle) -> Level1Result {
    let mut result = Level1Result::default();
    let events = &bundle.events;

    // Chain: contiguity, linkage, hash integrity. The first event's
    // prevHash is trusted (the range may start mid-chain).
    let mut chain_ok = true;
    for (i, e) in events.iter().enumerate() {
        if i > 0 {
            let prev = &events[i - 1];
            if e.seq_no != prev.seq_no + 1 || e.prev_hash != prev.event_hash {
                chain_ok = false;
                result.errors.push(format!("chain break at seqNo={}", e.seq_no));
                break;
            }
        } else if e.seq_no == 1 && e.prev_hash != GENESIS {
            chain_ok = false;
            result.errors.push("first event claims seqNo=1 but prevHash != GENESIS".to_string());
        }
        let recomputed = compute_event_hash(&bundle.instance_id, e.seq_no, &e.prev_hash, e.timestamp, &e.payload);
        if recomputed != e.event_hash {
            chain_ok = false;
            result.errors.push(format!("eventHash mismatch at seqNo={}", e.seq_no));
            break;
        }
    }
    result.chain_ok = chain_ok;

    // Signature.
    let body_value = serde_json::to_value(&bundle.report.body).expect("ReportBody always serializes");
    let body_canonical = canonicalize(&body_value);
    let body_hash = crate::canonical::sha256_bytes(&body_canonical);
    let manifest = &bundle.report.manifest;
    let sig_result = verify_report_signature(
        &body_hash,
        &manifest.signature,
        &manifest.public_key,
        &manifest.signing_key_version,
        &bundle.trusted_key_versions,
    );
    result.signature_ok = sig_result.is_ok();
    if let Err(e) = sig_result {
        result.errors.push(match e {
            SignatureVerifyError::SignatureInvalid => "SignatureInvalid".to_string(),
            SignatureVerifyError::KeyUntrusted => "KeyUntrusted".to_string(),
            SignatureVerifyError::MalformedSignature | SignatureVerifyError::MalformedPublicKey => {
                "SignatureInvalid".to_string()
            }
        });
    }

    // Ledger root.
    let event_hashes: Vec<String> = events.iter().map(|e| e.event_hash.clone()).collect();
    let recomputed_root = sha256_hex(&event_hashes.concat());
    result.ledger_root_ok = recomputed_root == manifest.ledger_root_hash;
    if !result.ledger_root_ok {
        result.errors.push("LedgerRootMismatch".to_string());
    }

    // Body hash.
    let recomputed_body_hash = hex::encode(body_hash);
    result.body_hash_ok = recomputed_body_hash == manifest.report_body_hash;
    if !result.body_hash_ok {
        result.errors.push("BodyHashMismatch".to_string());
    }

    // Replay reproducibility: an independent replay of the same events
    // must reach the same totals the embedded report claims.
    let state = replay_all(events);
    let series_max_drawdown = bundle
        .report
        .body
        .drawdown_series
        .iter()
        .map(|d| d.dd_abs.minor_units())
        .max()
        .unwrap_or(0);
    let reproducible = state.total_trades as usize == bundle.report.body.trades.len()
        && state.daily_equity.len() == bundle.report.body.daily_returns.len()
        && state.equity_curve.len() == bundle.report.body.equity_curve.len()
        && state.max_drawdown.minor_units() == series_max_drawdown;
    result.reproducible = reproducible;
    if !reproducible {
        result.errors.push("ReportNotReproducible".to_string());
    }

    // Checkpoints: replay the prefix through each checkpoint's seqNo.
    let mut checkpoints_ok = true;
    for cp in &bundle.checkpoints {
        let prefix: Vec<_> = events.iter().take_while(|e| e.seq_no <= cp.seq_no).cloned().collect();
        let prefix_state = replay_all(&prefix);
        if prefix_state.balance.canonical_string() != cp.balance.canonical_string()
            || prefix_state.equity.canonical_string() != cp.equity.canonical_string()
            || prefix_state.high_water_mark.canonical_string() != cp.high_water_mark.canonical_string()
        {
            checkpoints_ok = false;
            result.errors.push(format!("checkpoint mismatch at seqNo={}", cp.seq_no));
        }
    }
    result.checkpoints_ok = checkpoints_ok;

    if events.iter().any(|e| matches!(&e.payload, EventPayload::SessionStart { mode, .. } if matches!(mode, crate::events::SessionMode::Live)))
    {
        result.caveats.push("trading mode is self-reported and unverifiable at L1.".to_string());
    }

    result
}

fn verify_level2(bundle: &ProofBundle) -> Level2Result {
    let mut matched = 0u32;
    let mut mismatched = 0u32;

    for e in &bundle.events {
        if let EventPayload::BrokerEvidence { execution_timestamp, execution_price, linked_ticket, .. } =
            &e.payload
        {
            let found = bundle.events.iter().any(|other| match &other.payload {
                EventPayload::TradeOpen { ticket, open_price, .. } if ticket == linked_ticket => {
                    (other.timestamp - execution_timestamp).abs() < 60
                        && (open_price.to_f64() - execution_price.to_f64()).abs() < 1e-4
                }
                EventPayload::TradeClose { ticket, close_price, .. } if ticket == linked_ticket => {
                    (other.timestamp - execution_timestamp).abs() < 60
                        && (close_price.to_f64() - execution_price.to_f64()).abs() < 1e-4
                }
                _ => false,
            });
            if found {
                matched += 1;
            } else {
                mismatched += 1;
            }
        }
    }

    let digest_valid = bundle
        .events
        .iter()
        .filter(|e| matches!(e.payload, EventPayload::BrokerHistoryDigest { .. }))
        .count()
        == bundle.broker_digests.len();

    Level2Result { matched, mismatched, digest_valid }
}

fn verify_level3(bundle: &ProofBundle) -> Level3Result {
    let mut commitments_ok = true;
    let mut any_notarized = false;

    for c in &bundle.commitments {
        if !verify_commitment(c) {
            commitments_ok = false;
        }
        let event_at_seq = bundle.events.iter().find(|e| e.seq_no == c.seq_no);
        match event_at_seq {
            Some(e) if e.event_hash == c.last_event_hash => {}
            _ => commitments_ok = false,
        }
        if c.notarized_at.is_some() {
            any_notarized = true;
        }
    }

    Level3Result { commitments_ok, notarized: any_notarized && commitments_ok }
}

pub fn verify_bundle(bundle: &ProofBundle) -> VerificationResult {
    let l1 = verify_level1(bundle);

    let has_broker_material = !bundle.broker_evidence.is_empty() || !bundle.broker_digests.is_empty();
    let l2 = if has_broker_material { Some(verify_level2(bundle)) } else { None };

    let has_commitments = !bundle.commitments.is_empty();
    let l3 = if has_commitments { Some(verify_level3(bundle)) } else { None };

    let broker_clean = l2.as_ref().map(|r| r.mismatched == 0 && r.matched > 0);

    let level = if !l1.all_good() {
        VerificationLevel::L0None
    } else if l3.as_ref().is_some_and(|r| r.notarized) && broker_clean != Some(false) {
        // A notarized commitment only outranks broker corroboration when
        // broker evidence is absent or itself clean; contradicting broker
        // evidence caps trust at L1 regardless of notarization.
        VerificationLevel::L3Notarized
    } else if broker_clean == Some(true) {
        VerificationLevel::L2Broker
    } else {
        VerificationLevel::L1Ledger
    };

    let verified = l1.all_good();
    let summary = format!("{:?}: {}", level, level.investor_label());

    VerificationResult { level, l1, l2, l3, verified, summary }
}

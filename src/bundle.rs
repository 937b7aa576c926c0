//! Proof bundle assembly: the self-contained artifact an investor (or
//! their auditor) can verify offline, with no access to this service.
//!
//! Grounded in `fingerprint.rs`'s `RunFingerprint` bundling a strategy's
//! full provenance into one exportable value, extended here to a whole
//! event range plus its checkpoints and commitments rather than a single
//! hash.

use crate::chain::ChainVerification;
use crate::checkpoint::Checkpoint;
use crate::commitments::Commitment;
use crate::events::{Event, EventPayload};
use crate::report::{generate_report, InvestorReport};
use crate::signer::KeyPair;
use crate::verify::{verify_bundle, VerificationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofBundle {
    pub instance_id: String,
    pub report: InvestorReport,
    pub events: Vec<Event>,
    pub checkpoints: Vec<Checkpoint>,
    pub broker_evidence: Vec<Event>,
    pub broker_digests: Vec<Event>,
    pub commitments: Vec<Commitment>,
    #[serde(skip)]
    pub trusted_key_versions: Vec<String>,
    pub verification: VerificationResult,
}

impl ProofBundle {
    pub fn with_commitments(mut self, commitments: Vec<Commitment>) -> Self {
        self.commitments = commitments;
        self.verification = verify_bundle(&self);
        self
    }

    pub fn chain_verification(&self) -> ChainVerification {
        crate::chain::verify_chain(&self.events, &self.instance_id)
    }
}

/// Build a bundle from a full event range, sign its embedded report, then
/// run the verifier on the bundle's own contents so a client never has to
/// trust the server's opinion of its own output — only recompute it.
#[allow(clippy::too_many_arguments)]
pub fn assemble_proof_bundle(
    instance_id: &str,
    events: &[Event],
    checkpoints: &[Checkpoint],
    keys: &KeyPair,
    report_id: String,
    generated_at: DateTime<Utc>,
    trusted_key_versions: &[String],
) -> ProofBundle {
    let report = generate_report(instance_id, events, keys, report_id, generated_at);

    let broker_evidence: Vec<Event> =
        events.iter().filter(|e| matches!(e.payload, EventPayload::BrokerEvidence { .. })).cloned().collect();
    let broker_digests: Vec<Event> = events
        .iter()
        .filter(|e| matches!(e.payload, EventPayload::BrokerHistoryDigest { .. }))
        .cloned()
        .collect();

    let mut bundle = ProofBundle {
        instance_id: instance_id.to_string(),
        report,
        events: events.to_vec(),
        checkpoints: checkpoints.to_vec(),
        broker_evidence,
        broker_digests,
        commitments: Vec::new(),
        trusted_key_versions: trusted_key_versions.to_vec(),
        verification: VerificationResult {
            level: crate::report::VerificationLevel::L0None,
            l1: Default::default(),
            l2: None,
            l3: None,
            verified: false,
            summary: String::new(),
        },
    };
    bundle.verification = verify_bundle(&bundle);
    bundle
}

//! Periodic binding of chain head to financial state, for external
//! notarization.
//!
//! `commitmentHash` construction mirrors the component-hash-of-hashes
//! idea in `backtest_v2::fingerprint` (`H(component_1 || component_2 ||
//! ...)`), narrowed to the four fields this ledger commits to. The
//! notarization plug-in trait is grounded in the issuer-agnostic,
//! sign-over-a-hash `Receipt` shape from the openmatch types crate
//! (`crates/openmatch-types/src/receipt.rs`).

use crate::canonical::sha256_hex;
use crate::events::SeqNo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const COMMITMENT_INTERVAL: u64 = 500;

pub fn should_create_commitment(seq_no: SeqNo) -> bool {
    seq_no > 0 && seq_no % COMMITMENT_INTERVAL == 0
}

pub fn compute_commitment_hash(instance_id: &str, seq_no: SeqNo, last_event_hash: &str, state_hmac: &str) -> String {
    let input = format!("{instance_id}|{seq_no}|{last_event_hash}|{state_hmac}");
    sha256_hex(&input)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotarizationReceipt {
    pub provider: String,
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    pub proof: String,
    pub verify_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commitment {
    pub instance_id: String,
    pub seq_no: SeqNo,
    pub commitment_hash: String,
    pub last_event_hash: String,
    pub state_hmac: String,
    pub notarized_at: Option<DateTime<Utc>>,
    pub provider: Option<String>,
    pub proof: Option<String>,
    pub verify_url: Option<String>,
}

pub fn make_commitment(instance_id: &str, seq_no: SeqNo, last_event_hash: &str, state_hmac: &str) -> Commitment {
    let commitment_hash = compute_commitment_hash(instance_id, seq_no, last_event_hash, state_hmac);
    Commitment {
        instance_id: instance_id.to_string(),
        seq_no,
        commitment_hash,
        last_event_hash: last_event_hash.to_string(),
        state_hmac: state_hmac.to_string(),
        notarized_at: None,
        provider: None,
        proof: None,
        verify_url: None,
    }
}

pub fn verify_commitment(c: &Commitment) -> bool {
    compute_commitment_hash(&c.instance_id, c.seq_no, &c.last_event_hash, &c.state_hmac) == c.commitment_hash
}

/// The core is agnostic about how (or whether) a commitment gets
/// externally timestamped; it only stores whatever the provider returns.
pub trait NotarizationProvider: Send + Sync {
    fn notarize(&self, hash: &str) -> NotarizationReceipt;
    fn verify(&self, receipt: &NotarizationReceipt) -> bool;
}

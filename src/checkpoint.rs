//! Checkpoints: periodic HMAC-sealed snapshots of the financial state.
//!
//! Grounded in the `Hmac<Sha256>` signing pattern of `vault::execution`'s
//! CLOB request signing — same primitive, applied here to seal a state
//! snapshot rather than authenticate an outbound request.

use crate::canonical::canonicalize;
use crate::decimal::Cents;
use crate::events::SeqNo;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const CHECKPOINT_INTERVAL: u64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub instance_id: String,
    pub seq_no: SeqNo,
    pub balance: Cents,
    pub equity: Cents,
    pub high_water_mark: Cents,
    pub hmac: String,
}

pub fn should_create_checkpoint(seq_no: SeqNo) -> bool {
    seq_no > 0 && seq_no % CHECKPOINT_INTERVAL == 0
}

fn financial_fields_canonical(balance: Cents, equity: Cents, high_water_mark: Cents) -> String {
    canonicalize(&json!({
        "balance": balance.canonical_string(),
        "equity": equity.canonical_string(),
        "highWaterMark": high_water_mark.canonical_string(),
    }))
}

pub fn compute_state_hmac(
    server_secret: &[u8],
    balance: Cents,
    equity: Cents,
    high_water_mark: Cents,
) -> String {
    let canonical = financial_fields_canonical(balance, equity, high_water_mark);
    let mut mac = HmacSha256::new_from_slice(server_secret).expect("HMAC accepts any key length");
    mac.update(canonical.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn make_checkpoint(
    instance_id: &str,
    seq_no: SeqNo,
    server_secret: &[u8],
    balance: Cents,
    equity: Cents,
    high_water_mark: Cents,
) -> Checkpoint {
    let hmac = compute_state_hmac(server_secret, balance, equity, high_water_mark);
    Checkpoint { instance_id: instance_id.to_string(), seq_no, balance, equity, high_water_mark, hmac }
}

pub fn verify_checkpoint(checkpoint: &Checkpoint, server_secret: &[u8]) -> bool {
    let expected =
        compute_state_hmac(server_secret, checkpoint.balance, checkpoint.equity, checkpoint.high_water_mark);
    expected == checkpoint.hmac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_cadence_matches_interval() {
        assert!(!should_create_checkpoint(0));
        assert!(!should_create_checkpoint(99));
        assert!(should_create_checkpoint(100));
        assert!(should_create_checkpoint(200));
    }

    #[test]
    fn checkpoint_hmac_round_trips() {
        let secret = b"test-secret";
        let cp = make_checkpoint(
            "inst-1",
            100,
            secret,
            Cents::from_f64(10020.30),
            Cents::from_f64(10020.30),
            Cents::from_f64(10050.00),
        );
        assert!(verify_checkpoint(&cp, secret));
    }

    #[test]
    fn tampered_checkpoint_fails_verification() {
        let secret = b"test-secret";
        let mut cp = make_checkpoint(
            "inst-1",
            100,
            secret,
            Cents::from_f64(10020.30),
            Cents::from_f64(10020.30),
            Cents::from_f64(10050.00),
        );
        cp.balance = Cents::from_f64(999999.0);
        assert!(!verify_checkpoint(&cp, secret));
    }
}

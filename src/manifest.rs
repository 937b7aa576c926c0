//! Report manifest: binds a report body to the ledger and signs it.

use crate::canonical::sha256_hex;
use crate::signer::KeyPair;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: &str = "2.0";
pub const CALCULATION_VERSION: &str = "1.0";
pub const EQUITY_POLICY: &str = "BALANCE_PLUS_UNREALIZED";
pub const CASHFLOW_POLICY: &str = "ADJUST_HWM_NO_DD_RESET";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: String,
    pub report_id: String,
    pub instance_id: String,
    pub calculation_version: String,
    pub from_seq_no: Option<u64>,
    pub to_seq_no: Option<u64>,
    pub from_timestamp: Option<i64>,
    pub to_timestamp: Option<i64>,
    pub equity_policy: String,
    pub cashflow_policy: String,
    pub first_event_hash: Option<String>,
    pub last_event_hash: Option<String>,
    pub ledger_root_hash: String,
    pub report_body_hash: String,
    pub signature: String,
    pub public_key: String,
    pub signing_key_version: String,
    pub generated_at: DateTime<Utc>,
}

/// `ledgerRootHash = sha256(concat of all eventHashes in range)`.
pub fn compute_ledger_root_hash(event_hashes: &[String]) -> String {
    sha256_hex(&event_hashes.concat())
}

#[allow(clippy::too_many_arguments)]
pub fn build_manifest(
    keys: &KeyPair,
    report_id: String,
    instance_id: String,
    from_seq_no: Option<u64>,
    to_seq_no: Option<u64>,
    from_timestamp: Option<i64>,
    to_timestamp: Option<i64>,
    first_event_hash: Option<String>,
    last_event_hash: Option<String>,
    ledger_root_hash: String,
    report_body_canonical: &str,
    generated_at: DateTime<Utc>,
) -> Manifest {
    let report_body_hash_bytes = crate::canonical::sha256_bytes(report_body_canonical);
    let report_body_hash = hex::encode(report_body_hash_bytes);
    let signature = keys.sign(&report_body_hash_bytes);

    Manifest {
        schema_version: SCHEMA_VERSION.to_string(),
        report_id,
        instance_id,
        calculation_version: CALCULATION_VERSION.to_string(),
        from_seq_no,
        to_seq_no,
        from_timestamp,
        to_timestamp,
        equity_policy: EQUITY_POLICY.to_string(),
        cashflow_policy: CASHFLOW_POLICY.to_string(),
        first_event_hash,
        last_event_hash,
        ledger_root_hash,
        report_body_hash,
        signature,
        public_key: keys.public_key_hex(),
        signing_key_version: keys.signing_key_version(),
        generated_at,
    }
}

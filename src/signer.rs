//! Signing-key custody.
//!
//! A dedicated sub-component with a single entry point (`sign`); the
//! private key never leaves this module. Grounded in the openmatch
//! `Receipt::signing_bytes` pattern (sign over a hash, not the raw body)
//! and implemented with `ed25519-dalek`, generating keys via
//! `rand::rngs::OsRng`.

use crate::canonical::sha256_hex;
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;

/// `signingKeyVersion` is a short, stable fingerprint of the public key,
/// not the full hex — it's what goes in manifests and the trusted-key
/// registry.
pub fn fingerprint(public_key: &VerifyingKey) -> String {
    sha256_hex(&hex::encode(public_key.to_bytes()))[..16].to_string()
}

pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        Self { signing_key: SigningKey::generate(&mut csprng) }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self { signing_key: SigningKey::from_bytes(bytes) }
    }

    pub fn public_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key().to_bytes())
    }

    pub fn signing_key_version(&self) -> String {
        fingerprint(&self.public_key())
    }

    /// Sign the raw 32-byte body hash (never the hex string).
    pub fn sign(&self, body_hash: &[u8; 32]) -> String {
        let signature: Signature = self.signing_key.sign(body_hash);
        hex::encode(signature.to_bytes())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureVerifyError {
    SignatureInvalid,
    KeyUntrusted,
    MalformedSignature,
    MalformedPublicKey,
}

/// Verify a manifest signature. Rejects if the recomputed fingerprint of
/// `public_key_hex` doesn't match `signing_key_version`, and rejects if
/// `signing_key_version` isn't in `trusted_versions` (when that registry
/// is non-empty).
pub fn verify_report_signature(
    body_hash: &[u8; 32],
    signature_hex: &str,
    public_key_hex: &str,
    signing_key_version: &str,
    trusted_versions: &[String],
) -> Result<(), SignatureVerifyError> {
    let public_key_bytes: [u8; 32] = hex::decode(public_key_hex)
        .ok()
        .and_then(|v| v.try_into().ok())
        .ok_or(SignatureVerifyError::MalformedPublicKey)?;
    let public_key =
        VerifyingKey::from_bytes(&public_key_bytes).map_err(|_| SignatureVerifyError::MalformedPublicKey)?;

    if fingerprint(&public_key) != signing_key_version {
        return Err(SignatureVerifyError::KeyUntrusted);
    }
    if !trusted_versions.is_empty() && !trusted_versions.iter().any(|v| v == signing_key_version) {
        return Err(SignatureVerifyError::KeyUntrusted);
    }

    let signature_bytes: [u8; 64] = hex::decode(signature_hex)
        .ok()
        .and_then(|v| v.try_into().ok())
        .ok_or(SignatureVerifyError::MalformedSignature)?;
    let signature = Signature::from_bytes(&signature_bytes);

    public_key.verify(body_hash, &signature).map_err(|_| SignatureVerifyError::SignatureInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trips() {
        let keys = KeyPair::generate();
        let hash = [7u8; 32];
        let sig = keys.sign(&hash);
        let result = verify_report_signature(
            &hash,
            &sig,
            &keys.public_key_hex(),
            &keys.signing_key_version(),
            &[],
        );
        assert!(result.is_ok());
    }

    #[test]
    fn bit_flip_of_body_fails_verification() {
        let keys = KeyPair::generate();
        let hash = [7u8; 32];
        let sig = keys.sign(&hash);
        let mut flipped = hash;
        flipped[0] ^= 0x01;
        let result = verify_report_signature(
            &flipped,
            &sig,
            &keys.public_key_hex(),
            &keys.signing_key_version(),
            &[],
        );
        assert_eq!(result, Err(SignatureVerifyError::SignatureInvalid));
    }

    #[test]
    fn untrusted_key_version_is_rejected() {
        let keys = KeyPair::generate();
        let hash = [1u8; 32];
        let sig = keys.sign(&hash);
        let result = verify_report_signature(
            &hash,
            &sig,
            &keys.public_key_hex(),
            &keys.signing_key_version(),
            &["deadbeefdeadbeef".to_string()],
        );
        assert_eq!(result, Err(SignatureVerifyError::KeyUntrusted));
    }
}

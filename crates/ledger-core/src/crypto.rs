//! Signature verification of non-initial requests.
//!
//! The node verifies the signature of [`TransactionRequest::signed_bytes`]
//! against the public key held by the caller account. The algorithm is
//! chosen by [`SignatureKind`] in the node configuration.
//!
//! [`TransactionRequest::signed_bytes`]: ledger_sandbox_types::TransactionRequest::signed_bytes

use anyhow::{anyhow, Result};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use ledger_sandbox_types::encoding::base64_decode;

/// A signature algorithm for requests.
pub trait SignatureAlgorithm: Send + Sync {
    fn name(&self) -> &'static str;

    /// Checks `signature` of `message` against a base64 encoded public key.
    ///
    /// Returns `Ok(false)` for a well-formed but wrong signature and an
    /// error for malformed keys or signatures.
    fn verify(&self, message: &[u8], signature: &[u8], public_key: &str) -> Result<bool>;
}

/// Which algorithm a node uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureKind {
    /// Accept every signature. For local nodes and tests.
    #[default]
    Empty,
    /// Ed25519 over the signed bytes of the request.
    Ed25519,
}

impl SignatureKind {
    pub fn algorithm(self) -> Box<dyn SignatureAlgorithm> {
        match self {
            SignatureKind::Empty => Box::new(EmptySignature),
            SignatureKind::Ed25519 => Box::new(Ed25519Signature),
        }
    }
}

/// Accepts any signature.
pub struct EmptySignature;

impl SignatureAlgorithm for EmptySignature {
    fn name(&self) -> &'static str {
        "empty"
    }

    fn verify(&self, _message: &[u8], _signature: &[u8], _public_key: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Ed25519 signatures: 32-byte public keys, 64-byte signatures.
pub struct Ed25519Signature;

impl SignatureAlgorithm for Ed25519Signature {
    fn name(&self) -> &'static str {
        "ed25519"
    }

    fn verify(&self, message: &[u8], signature: &[u8], public_key: &str) -> Result<bool> {
        if signature.len() != 64 {
            return Err(anyhow!("Signature must be 64 bytes, found {}", signature.len()));
        }
        let key_bytes = base64_decode(public_key, "public key")?;
        let key_bytes: [u8; 32] = key_bytes
            .as_slice()
            .try_into()
            .map_err(|_| anyhow!("Public key must be 32 bytes, found {}", key_bytes.len()))?;

        let signature =
            Signature::from_slice(signature).map_err(|e| anyhow!("Invalid signature: {}", e))?;
        let key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| anyhow!("Invalid public key: {}", e))?;

        Ok(key.verify(message, &signature).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use ledger_sandbox_types::encoding::base64_encode;

    fn key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    #[test]
    fn test_ed25519_accepts_valid_signature() {
        let key = key();
        let public_key = base64_encode(key.verifying_key().as_bytes());
        let signature = key.sign(b"request bytes");

        let algorithm = SignatureKind::Ed25519.algorithm();
        assert!(algorithm
            .verify(b"request bytes", &signature.to_bytes(), &public_key)
            .unwrap());
        assert!(!algorithm
            .verify(b"other bytes", &signature.to_bytes(), &public_key)
            .unwrap());
    }

    #[test]
    fn test_ed25519_rejects_malformed_input() {
        let public_key = base64_encode(key().verifying_key().as_bytes());
        let algorithm = Ed25519Signature;
        assert!(algorithm.verify(b"m", &[0u8; 10], &public_key).is_err());
        assert!(algorithm
            .verify(b"m", &[0u8; 64], &base64_encode(&[1, 2, 3]))
            .is_err());
    }

    #[test]
    fn test_empty_accepts_anything() {
        assert!(EmptySignature.verify(b"m", &[], "").unwrap());
        assert_eq!(SignatureKind::default().algorithm().name(), "empty");
    }
}

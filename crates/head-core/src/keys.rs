//! Ed25519 key material and domain-separated signing helpers.
//!
//! Every signature in this layer is produced over `domain || canonical bytes`
//! so that witnesses for different payload kinds can never be replayed
//! against each other.

use crate::canonical::{canonical_encode, CanonicalError, Hash28};
use ed25519_dalek::{Signer, Verifier};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Domain separator for transaction body witnesses (v1).
pub const TX_SIGNING_DOMAIN_V1: &[u8] = b"HEAD:TX:V1\n";

/// Domain separator for off-chain snapshot multisignatures (v1).
pub const SNAPSHOT_SIGNING_DOMAIN_V1: &[u8] = b"HEAD:SNAPSHOT:V1\n";

/// Errors from signing and verification.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("canonical encoding error: {0}")]
    Canonical(#[from] CanonicalError),
    #[error("malformed verification key")]
    MalformedVerificationKey,
    #[error("malformed signature: expected 64 bytes, got {0}")]
    MalformedSignature(usize),
    #[error("signature verification failed")]
    VerificationFailed,
}

/// An Ed25519 verification key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VerificationKey(pub [u8; 32]);

impl VerificationKey {
    /// The 28-byte on-chain credential for this key.
    pub fn credential(&self) -> Hash28 {
        crate::canonical::hash28_bytes(&self.0)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// A detached Ed25519 signature (64 bytes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "serde_bytes")] pub Vec<u8>);

impl Signature {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Derive the verification key for an Ed25519 signing key.
pub fn verification_key(signing_key: &ed25519_dalek::SigningKey) -> VerificationKey {
    VerificationKey(signing_key.verifying_key().to_bytes())
}

/// Sign `domain || canonical(value)` with the given key.
pub fn sign_canonical<T: Serialize>(
    signing_key: &ed25519_dalek::SigningKey,
    domain: &[u8],
    value: &T,
) -> Result<Signature, KeyError> {
    let mut message = domain.to_vec();
    message.extend_from_slice(&canonical_encode(value)?);
    let signature = signing_key.sign(&message);
    Ok(Signature(signature.to_bytes().to_vec()))
}

/// Verify a signature over `domain || canonical(value)`.
pub fn verify_canonical<T: Serialize>(
    key: &VerificationKey,
    domain: &[u8],
    value: &T,
    signature: &Signature,
) -> Result<(), KeyError> {
    let verifying = ed25519_dalek::VerifyingKey::from_bytes(&key.0)
        .map_err(|_| KeyError::MalformedVerificationKey)?;
    let sig_bytes: [u8; 64] = signature
        .0
        .as_slice()
        .try_into()
        .map_err(|_| KeyError::MalformedSignature(signature.0.len()))?;
    let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
    let mut message = domain.to_vec();
    message.extend_from_slice(&canonical_encode(value)?);
    verifying
        .verify(&message, &sig)
        .map_err(|_| KeyError::VerificationFailed)
}

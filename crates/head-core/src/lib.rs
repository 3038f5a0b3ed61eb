#![forbid(unsafe_code)]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::float_cmp)]
#![deny(clippy::cast_precision_loss)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::cast_sign_loss)]

//! Core types and primitives for the Head on-chain interface layer.
//!
//! This crate defines the shared vocabulary of the chain layer: canonical
//! encoding and hashing, the UTxO and transaction models, chain points and
//! the rollback-capable state history, and the boundary event types the
//! node core exchanges with the chain layer.

use serde::{Deserialize, Serialize};

pub mod canonical;
pub mod chain;
pub mod events;
pub mod keys;
pub mod params;
pub mod tx;
pub mod utxo;

pub use canonical::{canonical_decode, canonical_encode, canonical_hash, CanonicalError, Hash28, Hash32};
pub use chain::{ChainPoint, ChainSlot, ChainStateAt, ChainStateError, ChainStateHistory, ChainTime};
pub use events::{ChainEvent, ChainEventEnvelope, EventId, OnChainTx, PostChainTx, PostTxError};
pub use keys::{Signature, VerificationKey};
pub use params::ProtocolParameters;
pub use tx::{ExecutionUnits, KeyWitness, Redeemer, RedeemerPtr, Tx, TxBody, ValidityRange};
pub use utxo::{Address, Credential, Datum, NetworkId, TxIn, TxOut, UTxO};

/// Cap on how far into the future a validity upper bound may be placed,
/// in seconds. Keeps submitted transactions plausibly includible even when
/// the configured contestation period is long.
pub const MAX_GRACE_TIME_SECS: u64 = 200;

/// Opaque 28-byte head identifier, derived from the seed input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HeadId(pub Hash28);

impl HeadId {
    /// Derive the head id from the seed input consumed by the init
    /// transaction.
    pub fn from_seed(seed: &TxIn) -> Result<Self, CanonicalError> {
        canonical::canonical_hash28(seed).map(Self)
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl std::fmt::Display for HeadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A reference to the UTxO input consumed by the init transaction.
///
/// Serialised `TxIn` bytes; the bijection with `TxIn` uniquely identifies
/// one head instance on chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HeadSeed(#[serde(with = "serde_bytes")] pub Vec<u8>);

impl HeadSeed {
    pub fn from_tx_in(input: &TxIn) -> Result<Self, CanonicalError> {
        canonical_encode(input).map(Self)
    }

    pub fn to_tx_in(&self) -> Result<TxIn, CanonicalError> {
        canonical_decode(&self.0)
    }
}

/// An off-chain participant identity, derived from an on-chain
/// verification key. A head has an ordered list of parties fixed at init.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Party {
    pub verification_key: VerificationKey,
}

impl Party {
    pub fn new(verification_key: VerificationKey) -> Self {
        Self { verification_key }
    }

    /// The party's on-chain participant credential.
    pub fn credential(&self) -> Hash28 {
        self.verification_key.credential()
    }
}

/// A non-negative duration in seconds bounding the contestation window.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ContestationPeriod(u64);

impl ContestationPeriod {
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    pub fn as_millis(&self) -> u64 {
        self.0.saturating_mul(1_000)
    }

    /// The delay used when computing a validity upper bound:
    /// `min(cp, MAX_GRACE_TIME_SECS)`, in milliseconds.
    pub fn effective_delay_millis(&self) -> u64 {
        self.0.min(MAX_GRACE_TIME_SECS).saturating_mul(1_000)
    }
}

impl std::fmt::Display for ContestationPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// The parameters a head is initialised with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadParameters {
    pub contestation_period: ContestationPeriod,
    pub parties: Vec<Party>,
}

/// Monotone snapshot sequence number. Snapshot 0 is the initial snapshot.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SnapshotNumber(pub u64);

impl std::fmt::Display for SnapshotNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An off-chain agreement on the head's UTxO set, signed by all parties.
///
/// A snapshot with a higher number supersedes a lower one during
/// contestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub number: SnapshotNumber,
    pub utxo: UTxO,
    pub signatures: Vec<Signature>,
}

impl Snapshot {
    /// The initial snapshot: number 0 over the collected UTxO, unsigned.
    pub fn initial(utxo: UTxO) -> Self {
        Self {
            number: SnapshotNumber(0),
            utxo,
            signatures: Vec::new(),
        }
    }

    /// Sign the snapshot content with a party's key and collect the
    /// signature.
    pub fn sign_by(
        &mut self,
        signing_key: &ed25519_dalek::SigningKey,
    ) -> Result<(), keys::KeyError> {
        let signature = keys::sign_canonical(
            signing_key,
            keys::SNAPSHOT_SIGNING_DOMAIN_V1,
            &(self.number, &self.utxo),
        )?;
        self.signatures.push(signature);
        Ok(())
    }

    /// Check one collected signature against a party's verification key.
    pub fn verify_signature(
        &self,
        key: &VerificationKey,
        signature: &Signature,
    ) -> Result<(), keys::KeyError> {
        keys::verify_canonical(
            key,
            keys::SNAPSHOT_SIGNING_DOMAIN_V1,
            &(self.number, &self.utxo),
            signature,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::Hash32;

    fn txin(seed: u8, index: u32) -> TxIn {
        TxIn::new(Hash32([seed; 32]), index)
    }

    #[test]
    fn head_seed_roundtrips_through_tx_in() {
        let input = txin(0xAB, 3);
        let seed = HeadSeed::from_tx_in(&input).unwrap();
        assert_eq!(seed.to_tx_in().unwrap(), input);
    }

    #[test]
    fn head_seed_rejects_garbage() {
        let seed = HeadSeed(vec![1, 2, 3]);
        assert!(seed.to_tx_in().is_err());
    }

    #[test]
    fn head_id_is_deterministic_per_seed() {
        let a = HeadId::from_seed(&txin(1, 0)).unwrap();
        let b = HeadId::from_seed(&txin(1, 0)).unwrap();
        let c = HeadId::from_seed(&txin(1, 1)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn contestation_period_effective_delay_is_capped() {
        let short = ContestationPeriod::from_secs(60);
        let long = ContestationPeriod::from_secs(3_600);
        assert_eq!(short.effective_delay_millis(), 60_000);
        assert_eq!(long.effective_delay_millis(), MAX_GRACE_TIME_SECS * 1_000);
    }

    #[test]
    fn parties_order_by_verification_key_bytes() {
        let a = Party::new(VerificationKey([1; 32]));
        let b = Party::new(VerificationKey([2; 32]));
        assert!(a < b);
    }

    #[test]
    fn initial_snapshot_is_number_zero() {
        let snapshot = Snapshot::initial(UTxO::new());
        assert_eq!(snapshot.number, SnapshotNumber(0));
        assert!(snapshot.signatures.is_empty());
    }

    #[test]
    fn snapshot_multisignature_collects_and_verifies() {
        let key_a = ed25519_dalek::SigningKey::from_bytes(&[1; 32]);
        let key_b = ed25519_dalek::SigningKey::from_bytes(&[2; 32]);
        let mut snapshot = Snapshot {
            number: SnapshotNumber(4),
            utxo: UTxO::new(),
            signatures: Vec::new(),
        };

        snapshot.sign_by(&key_a).unwrap();
        snapshot.sign_by(&key_b).unwrap();
        assert_eq!(snapshot.signatures.len(), 2);

        let vkey_a = keys::verification_key(&key_a);
        let vkey_b = keys::verification_key(&key_b);
        let sig_a = snapshot.signatures[0].clone();
        let sig_b = snapshot.signatures[1].clone();
        snapshot.verify_signature(&vkey_a, &sig_a).unwrap();
        snapshot.verify_signature(&vkey_b, &sig_b).unwrap();
        assert!(snapshot.verify_signature(&vkey_a, &sig_b).is_err());
    }
}

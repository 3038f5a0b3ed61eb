#![allow(clippy::module_name_repetitions)]

use bincode::Options;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// 32-byte hash wrapper used for transaction ids and block hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash32(pub [u8; 32]);

impl Hash32 {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, CanonicalError> {
        let bytes = hex::decode(hex_str).map_err(CanonicalError::from_hex)?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CanonicalError::from_hex("expected 32-byte hash"))?;
        Ok(Self(array))
    }
}

impl std::fmt::Display for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// 28-byte hash wrapper used for head identifiers and address credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash28(pub [u8; 28]);

impl Hash28 {
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, CanonicalError> {
        let bytes = hex::decode(hex_str).map_err(CanonicalError::from_hex)?;
        let array: [u8; 28] = bytes
            .try_into()
            .map_err(|_| CanonicalError::from_hex("expected 28-byte hash"))?;
        Ok(Self(array))
    }
}

impl std::fmt::Display for Hash28 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Canonical serialization/hashing errors.
#[derive(Debug, Error)]
pub enum CanonicalError {
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
    #[error("hash decode error: {0}")]
    FromHex(String),
}

impl CanonicalError {
    fn from_hex(err: impl ToString) -> Self {
        Self::FromHex(err.to_string())
    }
}

/// Canonical encoder options (fixed-int, little-endian, no trailing bytes).
fn encoder() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .reject_trailing_bytes()
}

/// Serialize using canonical encoding.
pub fn canonical_encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CanonicalError> {
    encoder().serialize(value).map_err(CanonicalError::from)
}

/// Decode canonical bytes back into the target structure.
pub fn canonical_decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CanonicalError> {
    encoder().deserialize(bytes).map_err(CanonicalError::from)
}

/// Hash any serializable value using canonical encoding and BLAKE3.
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<Hash32, CanonicalError> {
    let bytes = canonical_encode(value)?;
    Ok(Hash32(blake3::hash(&bytes).into()))
}

/// Hash any serializable value down to the 28-byte credential width.
pub fn canonical_hash28<T: Serialize>(value: &T) -> Result<Hash28, CanonicalError> {
    let full = canonical_hash(value)?;
    Ok(truncate28(full))
}

/// Hash raw bytes down to the 28-byte credential width.
pub fn hash28_bytes(bytes: &[u8]) -> Hash28 {
    truncate28(Hash32(blake3::hash(bytes).into()))
}

fn truncate28(full: Hash32) -> Hash28 {
    let mut out = [0u8; 28];
    out.copy_from_slice(&full.0[..28]);
    Hash28(out)
}

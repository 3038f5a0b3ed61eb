//! The ledger-side UTxO model: inputs, outputs, addresses and the
//! deterministic UTxO map.
//!
//! `UTxO` is a `BTreeMap` keyed by `TxIn` so iteration order is fixed by
//! `(transaction id bytes, output index)`. Fee coverage and observation both
//! rely on that ordering being reproducible across nodes.

use crate::canonical::{Hash28, Hash32};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Network discriminator carried by every address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetworkId(pub u64);

impl NetworkId {
    pub const MAINNET: Self = Self(0);
    pub const TESTNET: Self = Self(42);
}

/// A reference to a transaction output: transaction id plus output index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxIn {
    pub txid: Hash32,
    pub index: u32,
}

impl TxIn {
    pub fn new(txid: Hash32, index: u32) -> Self {
        Self { txid, index }
    }
}

impl std::fmt::Display for TxIn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.txid, self.index)
    }
}

/// The payment credential of an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Credential {
    /// Spending requires a key witness for the hashed verification key.
    Key(Hash28),
    /// Spending requires the script with this hash to succeed.
    Script(Hash28),
}

/// A ledger address: network discriminator plus payment credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    pub network: NetworkId,
    pub credential: Credential,
}

impl Address {
    pub fn payment(network: NetworkId, key_hash: Hash28) -> Self {
        Self {
            network,
            credential: Credential::Key(key_hash),
        }
    }

    pub fn script(network: NetworkId, script_hash: Hash28) -> Self {
        Self {
            network,
            credential: Credential::Script(script_hash),
        }
    }

    pub fn is_script(&self) -> bool {
        matches!(self.credential, Credential::Script(_))
    }
}

/// Opaque inline datum bytes (canonical encoding of a domain datum).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datum(#[serde(with = "serde_bytes")] pub Vec<u8>);

/// A transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub address: Address,
    /// Value in lovelace.
    pub value: u64,
    pub datum: Option<Datum>,
    pub reference_script: Option<Hash28>,
}

impl TxOut {
    pub fn new(address: Address, value: u64) -> Self {
        Self {
            address,
            value,
            datum: None,
            reference_script: None,
        }
    }

    pub fn with_datum(mut self, datum: Datum) -> Self {
        self.datum = Some(datum);
        self
    }
}

/// A set of unspent transaction outputs with deterministic iteration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UTxO(BTreeMap<TxIn, TxOut>);

impl UTxO {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn singleton(input: TxIn, output: TxOut) -> Self {
        let mut map = BTreeMap::new();
        map.insert(input, output);
        Self(map)
    }

    pub fn insert(&mut self, input: TxIn, output: TxOut) -> Option<TxOut> {
        self.0.insert(input, output)
    }

    pub fn remove(&mut self, input: &TxIn) -> Option<TxOut> {
        self.0.remove(input)
    }

    pub fn get(&self, input: &TxIn) -> Option<&TxOut> {
        self.0.get(input)
    }

    pub fn contains(&self, input: &TxIn) -> bool {
        self.0.contains_key(input)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TxIn, &TxOut)> {
        self.0.iter()
    }

    pub fn inputs(&self) -> impl Iterator<Item = &TxIn> {
        self.0.keys()
    }

    /// Total lovelace held by this set.
    pub fn total_value(&self) -> u64 {
        self.0.values().fold(0u64, |acc, o| acc.saturating_add(o.value))
    }

    /// True when no input of `self` appears in `other`.
    pub fn is_disjoint(&self, other: &UTxO) -> bool {
        self.0.keys().all(|i| !other.contains(i))
    }

    /// Inputs present in both sets.
    pub fn intersection_inputs<'a>(&'a self, other: &'a UTxO) -> Vec<TxIn> {
        self.0
            .keys()
            .filter(|&i| other.contains(i))
            .copied()
            .collect()
    }

    /// Union of two sets. Entries of `other` win on key collision.
    pub fn merged(mut self, other: UTxO) -> UTxO {
        self.0.extend(other.0);
        self
    }
}

impl FromIterator<(TxIn, TxOut)> for UTxO {
    fn from_iter<I: IntoIterator<Item = (TxIn, TxOut)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for UTxO {
    type Item = (TxIn, TxOut);
    type IntoIter = std::collections::btree_map::IntoIter<TxIn, TxOut>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

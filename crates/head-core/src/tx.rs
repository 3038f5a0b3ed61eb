//! The transaction model.
//!
//! Transactions here are the balanced-or-not bodies the constructors and the
//! wallet exchange. The id of a transaction is the canonical hash of its
//! body, so adding witnesses never changes it.

use crate::canonical::{canonical_encode, canonical_hash, CanonicalError, Hash32};
use crate::chain::ChainSlot;
use crate::keys::{Signature, VerificationKey};
use crate::utxo::{TxIn, TxOut, UTxO};
use serde::{Deserialize, Serialize};

/// Script execution budget, in abstract memory and step units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionUnits {
    pub mem: u64,
    pub steps: u64,
}

impl ExecutionUnits {
    pub const ZERO: Self = Self { mem: 0, steps: 0 };

    pub fn saturating_add(self, other: Self) -> Self {
        Self {
            mem: self.mem.saturating_add(other.mem),
            steps: self.steps.saturating_add(other.steps),
        }
    }

    /// True when either dimension exceeds the corresponding bound.
    pub fn exceeds(self, bound: Self) -> bool {
        self.mem > bound.mem || self.steps > bound.steps
    }

    pub fn is_zero(self) -> bool {
        self.mem == 0 && self.steps == 0
    }
}

/// Position of a redeemer: the index of the script input it spends, in the
/// transaction's sorted input list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RedeemerPtr(pub u32);

/// A script spending argument with its declared execution budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redeemer {
    pub ptr: RedeemerPtr,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
    pub ex_units: ExecutionUnits,
}

/// The validity interval of a transaction, in slots. `None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityRange {
    pub lower: Option<ChainSlot>,
    pub upper: Option<ChainSlot>,
}

impl ValidityRange {
    pub const UNBOUNDED: Self = Self {
        lower: None,
        upper: None,
    };

    pub fn between(lower: ChainSlot, upper: ChainSlot) -> Self {
        Self {
            lower: Some(lower),
            upper: Some(upper),
        }
    }

    pub fn from_slot(lower: ChainSlot) -> Self {
        Self {
            lower: Some(lower),
            upper: None,
        }
    }
}

/// The signed portion of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxBody {
    /// Consumed inputs, sorted ascending and unique.
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    /// Fee in lovelace.
    pub fee: u64,
    pub validity: ValidityRange,
    pub redeemers: Vec<Redeemer>,
}

impl TxBody {
    /// Build a body from unsorted inputs; inputs are deduplicated and sorted
    /// so redeemer pointers can be assigned against a stable order.
    pub fn new(mut inputs: Vec<TxIn>, outputs: Vec<TxOut>) -> Self {
        inputs.sort();
        inputs.dedup();
        Self {
            inputs,
            outputs,
            fee: 0,
            validity: ValidityRange::UNBOUNDED,
            redeemers: Vec::new(),
        }
    }

    /// Index of `input` in the sorted input list, for redeemer pointers.
    pub fn input_index(&self, input: &TxIn) -> Option<u32> {
        self.inputs
            .iter()
            .position(|i| i == input)
            .and_then(|p| u32::try_from(p).ok())
    }

    /// Sum of output values in lovelace.
    pub fn output_value(&self) -> u64 {
        self.outputs
            .iter()
            .fold(0u64, |acc, o| acc.saturating_add(o.value))
    }

    /// Total declared execution budget across redeemers.
    pub fn total_execution_units(&self) -> ExecutionUnits {
        self.redeemers
            .iter()
            .fold(ExecutionUnits::ZERO, |acc, r| {
                acc.saturating_add(r.ex_units)
            })
    }
}

/// An attached key witness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyWitness {
    pub verification_key: VerificationKey,
    pub signature: Signature,
}

/// A transaction: body plus witnesses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    pub body: TxBody,
    pub witnesses: Vec<KeyWitness>,
}

impl Tx {
    pub fn unsigned(body: TxBody) -> Self {
        Self {
            body,
            witnesses: Vec::new(),
        }
    }

    /// The transaction id: canonical hash of the body, witness-independent.
    pub fn id(&self) -> Result<Hash32, CanonicalError> {
        canonical_hash(&self.body)
    }

    /// Canonical wire size of the full transaction in bytes.
    pub fn size_bytes(&self) -> Result<u64, CanonicalError> {
        Ok(canonical_encode(self)?.len() as u64)
    }

    /// Apply this transaction to a UTxO set: drop spent inputs, add all
    /// produced outputs keyed by `(txid, output index)`.
    pub fn apply_to(&self, utxo: &UTxO) -> Result<UTxO, CanonicalError> {
        let txid = self.id()?;
        let mut next = utxo.clone();
        for input in &self.body.inputs {
            next.remove(input);
        }
        for (index, output) in self.body.outputs.iter().enumerate() {
            // Output indices fit u32 for any transaction we can build.
            let index = u32::try_from(index).unwrap_or(u32::MAX);
            next.insert(TxIn::new(txid, index), output.clone());
        }
        Ok(next)
    }

    /// The produced outputs of this transaction as a UTxO fragment.
    pub fn produced(&self) -> Result<UTxO, CanonicalError> {
        self.apply_to(&UTxO::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::Hash28;
    use crate::utxo::{Address, NetworkId};

    fn txin(seed: u8, index: u32) -> TxIn {
        TxIn::new(Hash32([seed; 32]), index)
    }

    fn txout(value: u64) -> TxOut {
        TxOut::new(
            Address::payment(NetworkId::TESTNET, Hash28([9; 28])),
            value,
        )
    }

    #[test]
    fn body_inputs_are_sorted_and_unique() {
        let body = TxBody::new(vec![txin(2, 0), txin(1, 0), txin(2, 0)], vec![]);
        assert_eq!(body.inputs, vec![txin(1, 0), txin(2, 0)]);
        assert_eq!(body.input_index(&txin(2, 0)), Some(1));
        assert_eq!(body.input_index(&txin(3, 0)), None);
    }

    #[test]
    fn tx_id_ignores_witnesses() {
        let body = TxBody::new(vec![txin(1, 0)], vec![txout(5)]);
        let unsigned = Tx::unsigned(body.clone());
        let signed = Tx {
            body,
            witnesses: vec![KeyWitness {
                verification_key: VerificationKey([7; 32]),
                signature: Signature(vec![0; 64]),
            }],
        };
        assert_eq!(unsigned.id().unwrap(), signed.id().unwrap());
    }

    #[test]
    fn apply_moves_value_from_inputs_to_outputs() {
        let spent = txin(1, 0);
        let utxo = UTxO::singleton(spent, txout(10));
        let tx = Tx::unsigned(TxBody::new(vec![spent], vec![txout(4), txout(6)]));

        let next = tx.apply_to(&utxo).unwrap();
        assert!(!next.contains(&spent));
        assert_eq!(next.len(), 2);
        assert_eq!(next.total_value(), 10);

        let txid = tx.id().unwrap();
        assert!(next.contains(&TxIn::new(txid, 0)));
        assert!(next.contains(&TxIn::new(txid, 1)));
    }

    #[test]
    fn execution_units_accumulate_and_bound() {
        let mut body = TxBody::new(vec![txin(1, 0)], vec![]);
        body.redeemers.push(Redeemer {
            ptr: RedeemerPtr(0),
            data: vec![],
            ex_units: ExecutionUnits { mem: 10, steps: 100 },
        });
        body.redeemers.push(Redeemer {
            ptr: RedeemerPtr(0),
            data: vec![],
            ex_units: ExecutionUnits { mem: 5, steps: 50 },
        });
        let total = body.total_execution_units();
        assert_eq!(total, ExecutionUnits { mem: 15, steps: 150 });
        assert!(total.exceeds(ExecutionUnits { mem: 14, steps: 1_000 }));
        assert!(!total.exceeds(ExecutionUnits { mem: 15, steps: 150 }));
    }
}

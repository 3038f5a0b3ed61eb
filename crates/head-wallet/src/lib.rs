#![forbid(unsafe_code)]

//! A tiny single-address wallet.
//!
//! Tracks the UTxO controlled by one payment key, hands out a seed input
//! for head initialisation, covers fees deterministically and signs
//! transaction bodies. The snapshot is updated on every roll-forward and
//! read consistently by `cover_fee`.

use head_core::keys::{self, VerificationKey, TX_SIGNING_DOMAIN_V1};
use head_core::params::ProtocolParameters;
use head_core::tx::{KeyWitness, Tx};
use head_core::utxo::{Address, NetworkId, TxIn, UTxO};
use std::sync::Mutex;
use tracing::debug;

pub mod coverage;

pub use coverage::{CoverFeeError, WITNESS_OVERHEAD_BYTES};

/// Wallet over one Ed25519 payment key.
pub struct TinyWallet {
    signing_key: ed25519_dalek::SigningKey,
    verification_key: VerificationKey,
    address: Address,
    params: ProtocolParameters,
    utxo: Mutex<UTxO>,
}

impl TinyWallet {
    pub fn new(
        signing_key: ed25519_dalek::SigningKey,
        network: NetworkId,
        params: ProtocolParameters,
    ) -> Self {
        let verification_key = keys::verification_key(&signing_key);
        let address = Address::payment(network, verification_key.credential());
        Self {
            signing_key,
            verification_key,
            address,
            params,
            utxo: Mutex::new(UTxO::new()),
        }
    }

    pub fn verification_key(&self) -> VerificationKey {
        self.verification_key
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// A consistent snapshot of the wallet UTxO.
    pub fn get_utxo(&self) -> UTxO {
        self.utxo.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Replace the tracked UTxO wholesale, e.g. after startup recovery.
    pub fn reset_utxo(&self, utxo: UTxO) {
        *self.utxo.lock().unwrap_or_else(|e| e.into_inner()) = utxo;
    }

    /// Any one controlled input suitable as a head seed; `None` iff the
    /// wallet is empty. Deterministic: the first input in byte order.
    pub fn get_seed_input(&self) -> Option<TxIn> {
        self.utxo
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .inputs()
            .next()
            .copied()
    }

    /// Apply a block's transactions to the snapshot: outputs addressed to
    /// us are added, our spent inputs are removed.
    pub fn update_from_block(&self, txs: &[Tx]) {
        let mut utxo = self.utxo.lock().unwrap_or_else(|e| e.into_inner());
        for tx in txs {
            let Ok(txid) = tx.id() else { continue };
            for input in &tx.body.inputs {
                utxo.remove(input);
            }
            for (index, output) in tx.body.outputs.iter().enumerate() {
                if output.address == self.address {
                    let index = u32::try_from(index).unwrap_or(u32::MAX);
                    utxo.insert(TxIn::new(txid, index), output.clone());
                }
            }
        }
        debug!(utxo_count = utxo.len(), "wallet snapshot updated");
    }

    /// Balance a partial transaction: add wallet inputs until outputs plus
    /// the re-priced fee are covered, then return change to the wallet.
    ///
    /// `known_utxo` resolves the script-locked inputs the caller already
    /// placed in the transaction so execution can be priced.
    pub fn cover_fee(&self, known_utxo: &UTxO, partial: &Tx) -> Result<Tx, CoverFeeError> {
        let snapshot = self.get_utxo();
        coverage::cover_fee(&self.params, self.address, &snapshot, known_utxo, partial)
    }

    /// Attach our witness. Pure with respect to the wallet snapshot.
    pub fn sign(&self, mut tx: Tx) -> Tx {
        match keys::sign_canonical(&self.signing_key, TX_SIGNING_DOMAIN_V1, &tx.body) {
            Ok(signature) => {
                tx.witnesses.push(KeyWitness {
                    verification_key: self.verification_key,
                    signature,
                });
                tx
            }
            // Canonical encoding of an in-memory body does not fail; if it
            // ever did, returning the unsigned transaction lets submission
            // surface the rejection instead of panicking here.
            Err(_) => tx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use head_core::canonical::{canonical_encode, Hash32};
    use head_core::keys::verify_canonical;
    use head_core::tx::TxBody;
    use head_core::utxo::TxOut;

    fn wallet() -> TinyWallet {
        TinyWallet::new(
            ed25519_dalek::SigningKey::from_bytes(&[7; 32]),
            NetworkId::TESTNET,
            ProtocolParameters::default(),
        )
    }

    fn txin(seed: u8, index: u32) -> TxIn {
        TxIn::new(Hash32([seed; 32]), index)
    }

    fn fund(wallet: &TinyWallet, entries: &[(TxIn, u64)]) {
        let utxo: UTxO = entries
            .iter()
            .map(|(input, value)| (*input, TxOut::new(wallet.address(), *value)))
            .collect();
        wallet.reset_utxo(utxo);
    }

    #[test]
    fn empty_wallet_has_no_seed_input() {
        let wallet = wallet();
        assert!(wallet.get_seed_input().is_none());
    }

    #[test]
    fn seed_input_is_first_in_byte_order() {
        let wallet = wallet();
        fund(&wallet, &[(txin(9, 0), 10), (txin(1, 2), 20), (txin(1, 1), 30)]);
        assert_eq!(wallet.get_seed_input(), Some(txin(1, 1)));
    }

    #[test]
    fn update_from_block_tracks_our_outputs_and_spends() {
        let wallet = wallet();
        let seed = txin(3, 0);
        fund(&wallet, &[(seed, 1_000_000)]);

        // A transaction spending our input and paying us one output back.
        let tx = Tx::unsigned(TxBody::new(
            vec![seed],
            vec![
                TxOut::new(wallet.address(), 400_000),
                TxOut::new(
                    Address::payment(NetworkId::TESTNET, VerificationKey([9; 32]).credential()),
                    500_000,
                ),
            ],
        ));
        let txid = tx.id().unwrap();
        wallet.update_from_block(std::slice::from_ref(&tx));

        let utxo = wallet.get_utxo();
        assert!(!utxo.contains(&seed));
        assert_eq!(utxo.len(), 1);
        assert_eq!(utxo.get(&TxIn::new(txid, 0)).unwrap().value, 400_000);
    }

    #[test]
    fn sign_attaches_a_verifiable_witness() {
        let wallet = wallet();
        let tx = Tx::unsigned(TxBody::new(vec![txin(1, 0)], vec![]));
        let signed = wallet.sign(tx);

        assert_eq!(signed.witnesses.len(), 1);
        let witness = &signed.witnesses[0];
        verify_canonical(
            &witness.verification_key,
            TX_SIGNING_DOMAIN_V1,
            &signed.body,
            &witness.signature,
        )
        .expect("witness verifies");
    }

    #[test]
    fn sign_does_not_change_the_tx_id() {
        let wallet = wallet();
        let tx = Tx::unsigned(TxBody::new(vec![txin(1, 0)], vec![]));
        let id_before = tx.id().unwrap();
        let signed = wallet.sign(tx);
        assert_eq!(signed.id().unwrap(), id_before);
    }

    #[test]
    fn cover_fee_is_deterministic() {
        let wallet = wallet();
        fund(
            &wallet,
            &[
                (txin(1, 0), 5_000_000),
                (txin(2, 0), 3_000_000),
                (txin(3, 0), 8_000_000),
            ],
        );
        let partial = Tx::unsigned(TxBody::new(
            vec![],
            vec![TxOut::new(
                Address::payment(NetworkId::TESTNET, VerificationKey([9; 32]).credential()),
                2_000_000,
            )],
        ));

        let a = wallet.cover_fee(&UTxO::new(), &partial).unwrap();
        let b = wallet.cover_fee(&UTxO::new(), &partial).unwrap();
        assert_eq!(
            canonical_encode(&a).unwrap(),
            canonical_encode(&b).unwrap()
        );
    }
}

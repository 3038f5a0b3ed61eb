//! Deterministic fee coverage.
//!
//! Selection is greedy by descending value with ties broken by input byte
//! order, and the fee is re-priced after every added input because it grows
//! with transaction size. Change below the minimum UTxO value is absorbed
//! into the fee instead of producing an unspendable output.

use head_core::params::ProtocolParameters;
use head_core::tx::{ExecutionUnits, RedeemerPtr, Tx};
use head_core::utxo::{Address, TxIn, TxOut, UTxO};
use thiserror::Error;

/// Canonical bytes one attached key witness adds to a transaction.
/// Accounted for up front so the priced size matches the signed size.
pub const WITNESS_OVERHEAD_BYTES: u64 = 112;

#[derive(Debug, Error)]
pub enum CoverFeeError {
    #[error("wallet holds no fuel outputs")]
    NoFuelUtxoFound,
    #[error("not enough funds: {available} available, {required} required")]
    NotEnoughFunds { available: u64, required: u64 },
    #[error("script execution failed at {ptr:?}: {reason}")]
    ScriptExecutionFailed { ptr: RedeemerPtr, reason: String },
    #[error("{reason}")]
    Other { reason: String },
}

fn tx_size(tx: &Tx, extra_witnesses: u64) -> Result<u64, CoverFeeError> {
    let base = tx.size_bytes().map_err(|e| CoverFeeError::Other {
        reason: format!("cannot size transaction: {e}"),
    })?;
    Ok(base.saturating_add(WITNESS_OVERHEAD_BYTES.saturating_mul(extra_witnesses)))
}

/// Check the declared execution budgets against the ledger cap, attributing
/// the failure to the first redeemer that exhausts it.
fn check_execution_budget(
    params: &ProtocolParameters,
    tx: &Tx,
) -> Result<ExecutionUnits, CoverFeeError> {
    let mut running = ExecutionUnits::ZERO;
    for redeemer in &tx.body.redeemers {
        running = running.saturating_add(redeemer.ex_units);
        if running.exceeds(params.max_execution_units) {
            return Err(CoverFeeError::ScriptExecutionFailed {
                ptr: redeemer.ptr,
                reason: "transaction execution budget exhausted".into(),
            });
        }
    }
    Ok(running)
}

/// Value of every input already present in the partial transaction,
/// resolved against the caller-known UTxO and the wallet snapshot.
fn resolve_inputs(
    partial: &Tx,
    known_utxo: &UTxO,
    wallet_utxo: &UTxO,
) -> Result<u64, CoverFeeError> {
    let mut total = 0u64;
    for input in &partial.body.inputs {
        let output = known_utxo
            .get(input)
            .or_else(|| wallet_utxo.get(input))
            .ok_or_else(|| CoverFeeError::Other {
                reason: format!("cannot resolve input {input}"),
            })?;
        total = total.saturating_add(output.value);
    }
    Ok(total)
}

/// Balance `partial` with wallet inputs and a change output.
///
/// Deterministic: the same wallet snapshot and partial transaction always
/// produce byte-identical output.
pub fn cover_fee(
    params: &ProtocolParameters,
    wallet_address: Address,
    wallet_utxo: &UTxO,
    known_utxo: &UTxO,
    partial: &Tx,
) -> Result<Tx, CoverFeeError> {
    if wallet_utxo.is_empty() {
        return Err(CoverFeeError::NoFuelUtxoFound);
    }
    let ex_units = check_execution_budget(params, partial)?;

    let resolved = resolve_inputs(partial, known_utxo, wallet_utxo)?;
    let output_value = partial.body.output_value();

    // Candidates: wallet inputs not already consumed, richest first, ties by
    // input byte order for reproducibility across nodes.
    let mut candidates: Vec<(TxIn, u64)> = wallet_utxo
        .iter()
        .filter(|&(input, _)| !partial.body.inputs.contains(input))
        .map(|(input, output)| (*input, output.value))
        .collect();
    candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut selected: Vec<TxIn> = Vec::new();
    let mut selected_value = 0u64;
    let mut next_candidate = candidates.into_iter();

    loop {
        let available = resolved.saturating_add(selected_value);

        // Price the candidate with a change output in place; redeemer
        // pointers shift as inputs are merged in, so rebuild each round.
        let mut balanced = rebuild_with(partial, &selected, Some(0));
        let size = tx_size(&balanced, 1)?;
        let fee = params.min_fee(size, ex_units);
        let required = output_value.saturating_add(fee);

        if available >= required {
            let change = available - required;
            if change >= params.min_utxo_value {
                balanced = rebuild_with(partial, &selected, Some(change));
                set_fee(&mut balanced, fee);
            } else {
                // Absorb dust into the fee; the change output disappears and
                // the fee identity still holds exactly.
                balanced = rebuild_with(partial, &selected, None);
                let absorbed = available - output_value;
                set_fee(&mut balanced, absorbed);
            }
            let final_size = tx_size(&balanced, 1)?;
            if final_size > params.max_tx_size {
                return Err(CoverFeeError::Other {
                    reason: format!(
                        "transaction size {final_size} exceeds maximum {}",
                        params.max_tx_size
                    ),
                });
            }
            return Ok(balance_change_address(balanced, wallet_address));
        }

        match next_candidate.next() {
            Some((input, value)) => {
                selected.push(input);
                selected_value = selected_value.saturating_add(value);
            }
            None => {
                return Err(CoverFeeError::NotEnoughFunds {
                    available,
                    required,
                })
            }
        }
    }
}

/// Rebuild the partial transaction with extra inputs and an optional change
/// output of the given value, re-pointing redeemers at the merged input
/// order.
fn rebuild_with(partial: &Tx, extra_inputs: &[TxIn], change: Option<u64>) -> Tx {
    let original_inputs = partial.body.inputs.clone();
    let mut inputs = original_inputs.clone();
    inputs.extend_from_slice(extra_inputs);

    let mut outputs = partial.body.outputs.clone();
    if let Some(change_value) = change {
        outputs.push(TxOut::new(CHANGE_PLACEHOLDER, change_value));
    }

    let mut body = head_core::tx::TxBody::new(inputs, outputs);
    body.validity = partial.body.validity;
    body.fee = partial.body.fee;

    // Redeemer pointers refer to positions in the sorted input list; merged
    // wallet inputs may shift them.
    body.redeemers = partial
        .body
        .redeemers
        .iter()
        .map(|redeemer| {
            let target = original_inputs
                .get(redeemer.ptr.0 as usize)
                .copied()
                .unwrap_or_else(|| original_inputs.first().copied().unwrap_or(DUMMY_INPUT));
            let ptr = body
                .input_index(&target)
                .map(RedeemerPtr)
                .unwrap_or(redeemer.ptr);
            head_core::tx::Redeemer {
                ptr,
                data: redeemer.data.clone(),
                ex_units: redeemer.ex_units,
            }
        })
        .collect();
    body.redeemers.sort_by_key(|r| r.ptr);

    Tx {
        body,
        witnesses: partial.witnesses.clone(),
    }
}

// The placeholder keeps sizing stable while the change value is unknown;
// it is rewritten to the wallet address before the balanced transaction is
// returned.
const CHANGE_PLACEHOLDER: Address = Address {
    network: head_core::utxo::NetworkId(0),
    credential: head_core::utxo::Credential::Key(head_core::canonical::Hash28([0; 28])),
};

const DUMMY_INPUT: TxIn = TxIn {
    txid: head_core::canonical::Hash32([0; 32]),
    index: 0,
};

fn set_fee(tx: &mut Tx, fee: u64) {
    tx.body.fee = fee;
}

fn balance_change_address(mut tx: Tx, wallet_address: Address) -> Tx {
    for output in &mut tx.body.outputs {
        if output.address == CHANGE_PLACEHOLDER {
            output.address = wallet_address;
        }
    }
    tx
}

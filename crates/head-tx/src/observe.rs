//! Transaction observers: classify layer-1 transactions against the known
//! head UTxO and maintain the head-relevant slice.
//!
//! Observation is total and pure: a transaction that is not a head
//! transaction leaves the UTxO untouched and produces no observation.

use crate::datum::{HeadDatum, OutputDatum, ScriptRegistry};
use head_core::chain::ChainTime;
use head_core::events::OnChainTx;
use head_core::tx::Tx;
use head_core::utxo::{NetworkId, TxIn, TxOut, UTxO};
use head_core::{ContestationPeriod, HeadId, HeadSeed, Party, SnapshotNumber};
use serde::{Deserialize, Serialize};

/// A recognised head lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeadObservation {
    Init {
        head_id: HeadId,
        head_seed: HeadSeed,
        parties: Vec<Party>,
        contestation_period: ContestationPeriod,
    },
    Commit {
        head_id: HeadId,
        party: Party,
        committed: UTxO,
    },
    Abort {
        head_id: HeadId,
    },
    CollectCom {
        head_id: HeadId,
        utxo: UTxO,
    },
    Close {
        head_id: HeadId,
        snapshot_number: SnapshotNumber,
        contestation_deadline: ChainTime,
    },
    Contest {
        head_id: HeadId,
        snapshot_number: SnapshotNumber,
    },
    Fanout {
        head_id: HeadId,
    },
}

impl HeadObservation {
    pub fn kind(&self) -> &'static str {
        match self {
            HeadObservation::Init { .. } => "Init",
            HeadObservation::Commit { .. } => "Commit",
            HeadObservation::Abort { .. } => "Abort",
            HeadObservation::CollectCom { .. } => "CollectCom",
            HeadObservation::Close { .. } => "Close",
            HeadObservation::Contest { .. } => "Contest",
            HeadObservation::Fanout { .. } => "Fanout",
        }
    }

    pub fn head_id(&self) -> HeadId {
        match self {
            HeadObservation::Init { head_id, .. }
            | HeadObservation::Commit { head_id, .. }
            | HeadObservation::Abort { head_id }
            | HeadObservation::CollectCom { head_id, .. }
            | HeadObservation::Close { head_id, .. }
            | HeadObservation::Contest { head_id, .. }
            | HeadObservation::Fanout { head_id } => *head_id,
        }
    }
}

/// Convert an observation into the protocol event the node core consumes.
/// Lossless w.r.t. protocol semantics.
pub fn convert_observation(observation: HeadObservation) -> OnChainTx {
    match observation {
        HeadObservation::Init {
            head_id,
            head_seed,
            parties,
            contestation_period,
        } => OnChainTx::OnInitTx {
            head_id,
            head_seed,
            contestation_period,
            parties,
        },
        HeadObservation::Commit {
            head_id,
            party,
            committed,
        } => OnChainTx::OnCommitTx {
            head_id,
            party,
            committed,
        },
        HeadObservation::Abort { head_id } => OnChainTx::OnAbortTx { head_id },
        HeadObservation::CollectCom { head_id, utxo } => {
            OnChainTx::OnCollectComTx { head_id, utxo }
        }
        HeadObservation::Close {
            head_id,
            snapshot_number,
            contestation_deadline,
        } => OnChainTx::OnCloseTx {
            head_id,
            snapshot_number,
            contestation_deadline,
        },
        HeadObservation::Contest {
            head_id,
            snapshot_number,
        } => OnChainTx::OnContestTx {
            head_id,
            snapshot_number,
        },
        HeadObservation::Fanout { head_id } => OnChainTx::OnFanoutTx { head_id },
    }
}

fn decoded_datum(output: &TxOut) -> Option<OutputDatum> {
    OutputDatum::decode(output.datum.as_ref()?)
}

/// The new thread output produced by a transaction, if any.
fn produced_thread_datum(
    network: NetworkId,
    scripts: &ScriptRegistry,
    tx: &Tx,
) -> Option<HeadDatum> {
    let address = scripts.head_address(network);
    tx.body.outputs.iter().find_map(|output| {
        if output.address != address {
            return None;
        }
        match decoded_datum(output)? {
            OutputDatum::Head(datum) => Some(datum),
            _ => None,
        }
    })
}

/// Apply an observed transaction to the tracked slice. Script-locked
/// outputs are always tracked; for terminal transactions (abort, fanout)
/// every produced output is tracked, since those *are* the layer-1 result.
fn advance_utxo(
    network: NetworkId,
    scripts: &ScriptRegistry,
    utxo: &UTxO,
    tx: &Tx,
    keep_all_outputs: bool,
) -> UTxO {
    let Ok(txid) = tx.id() else {
        return utxo.clone();
    };
    let mut next = utxo.clone();
    for input in &tx.body.inputs {
        next.remove(input);
    }
    let script_addresses = [
        scripts.head_address(network),
        scripts.initial_address(network),
        scripts.commit_address(network),
    ];
    for (index, output) in tx.body.outputs.iter().enumerate() {
        let tracked = keep_all_outputs || script_addresses.contains(&output.address);
        if tracked {
            let index = u32::try_from(index).unwrap_or(u32::MAX);
            next.insert(TxIn::new(txid, index), output.clone());
        }
    }
    next
}

/// Inspect one transaction against the known head UTxO.
///
/// Returns the updated UTxO and the observation, or the unchanged UTxO and
/// `None` when the transaction does not concern the head.
pub fn observe_tx(
    network: NetworkId,
    scripts: &ScriptRegistry,
    utxo: &UTxO,
    tx: &Tx,
) -> (UTxO, Option<HeadObservation>) {
    // Which tracked outputs does this transaction spend?
    let spent: Vec<(&TxIn, &TxOut)> = tx
        .body
        .inputs
        .iter()
        .filter_map(|input| utxo.get(input).map(|output| (input, output)))
        .collect();

    let spent_thread = spent.iter().find_map(|&(_, output)| {
        if output.address != scripts.head_address(network) {
            return None;
        }
        match decoded_datum(output)? {
            OutputDatum::Head(datum) => Some(datum),
            _ => None,
        }
    });

    if let Some(previous) = spent_thread {
        let produced = produced_thread_datum(network, scripts, tx);
        let observation = match (&previous, produced) {
            (HeadDatum::Initial { head_id, .. }, Some(HeadDatum::Open { utxo: opened, .. })) => {
                Some(HeadObservation::CollectCom {
                    head_id: *head_id,
                    utxo: opened,
                })
            }
            (HeadDatum::Initial { head_id, .. }, None) => {
                Some(HeadObservation::Abort { head_id: *head_id })
            }
            (
                HeadDatum::Open { head_id, .. },
                Some(HeadDatum::Closed {
                    snapshot_number,
                    contestation_deadline,
                    ..
                }),
            ) => Some(HeadObservation::Close {
                head_id: *head_id,
                snapshot_number,
                contestation_deadline,
            }),
            (
                HeadDatum::Closed {
                    head_id,
                    snapshot_number: current,
                    ..
                },
                Some(HeadDatum::Closed {
                    snapshot_number: contested,
                    ..
                }),
            ) if contested > *current => Some(HeadObservation::Contest {
                head_id: *head_id,
                snapshot_number: contested,
            }),
            (HeadDatum::Closed { head_id, .. }, None) => {
                Some(HeadObservation::Fanout { head_id: *head_id })
            }
            // Anything else consuming the thread is not a legal transition.
            _ => None,
        };

        return match observation {
            Some(observation) => {
                let keep_all = matches!(
                    observation,
                    HeadObservation::Abort { .. } | HeadObservation::Fanout { .. }
                );
                (
                    advance_utxo(network, scripts, utxo, tx, keep_all),
                    Some(observation),
                )
            }
            None => (utxo.clone(), None),
        };
    }

    // A spent initial output plus a commit output is a commit.
    let spends_initial = spent.iter().any(|&(_, output)| {
        output.address == scripts.initial_address(network)
            && matches!(decoded_datum(output), Some(OutputDatum::Initial(_)))
    });
    if spends_initial {
        let commit = tx.body.outputs.iter().find_map(|output| {
            if output.address != scripts.commit_address(network) {
                return None;
            }
            match decoded_datum(output)? {
                OutputDatum::Commit(datum) => Some(datum),
                _ => None,
            }
        });
        if let Some(commit) = commit {
            let observation = HeadObservation::Commit {
                head_id: commit.head_id,
                party: commit.party,
                committed: commit.committed,
            };
            return (
                advance_utxo(network, scripts, utxo, tx, false),
                Some(observation),
            );
        }
        return (utxo.clone(), None);
    }

    // A fresh thread output in the initial phase announces a new head, but
    // only when the recorded seed is actually consumed by this transaction.
    if let Some(HeadDatum::Initial {
        head_id,
        seed,
        parties,
        contestation_period,
    }) = produced_thread_datum(network, scripts, tx)
    {
        let seed_consumed = seed
            .to_tx_in()
            .ok()
            .is_some_and(|seed_input| tx.body.inputs.contains(&seed_input));
        let derived = seed
            .to_tx_in()
            .ok()
            .and_then(|seed_input| HeadId::from_seed(&seed_input).ok());
        let initial_outputs = tx
            .body
            .outputs
            .iter()
            .filter(|&output| {
                output.address == scripts.initial_address(network)
                    && matches!(decoded_datum(output), Some(OutputDatum::Initial(d)) if d.head_id == head_id)
            })
            .count();
        if seed_consumed && derived == Some(head_id) && initial_outputs == parties.len() {
            let observation = HeadObservation::Init {
                head_id,
                head_seed: seed,
                parties,
                contestation_period,
            };
            return (
                advance_utxo(network, scripts, utxo, tx, false),
                Some(observation),
            );
        }
    }

    (utxo.clone(), None)
}

/// Fold `observe_tx` over a block's transactions, threading the UTxO.
pub fn observe_all(
    network: NetworkId,
    scripts: &ScriptRegistry,
    utxo: &UTxO,
    txs: &[Tx],
) -> (UTxO, Vec<HeadObservation>) {
    let mut current = utxo.clone();
    let mut observations = Vec::new();
    for tx in txs {
        let (next, observation) = observe_tx(network, scripts, &current, tx);
        current = next;
        if let Some(observation) = observation {
            observations.push(observation);
        }
    }
    (current, observations)
}

//! Pure transaction constructors, one per protocol action.
//!
//! Each constructor validates its lifecycle precondition against the
//! head-relevant UTxO slice and refuses otherwise. The returned transactions
//! are unbalanced: fee coverage, change and signing are the wallet's job.

use crate::context::ChainContext;
use crate::datum::{
    CommitDatum, HeadDatum, HeadRedeemer, InitialDatum, OutputDatum, SCRIPT_SPEND_BUDGET,
};
use head_core::canonical::CanonicalError;
use head_core::chain::{ChainSlot, ChainTime};
use head_core::keys::VerificationKey;
use head_core::tx::{Redeemer, RedeemerPtr, Tx, TxBody, ValidityRange};
use head_core::utxo::{TxIn, TxOut, UTxO};
use head_core::{HeadId, HeadParameters, HeadSeed, Snapshot, SnapshotNumber};
use thiserror::Error;

/// Lovelace placed on the thread output at init.
pub const THREAD_OUTPUT_LOVELACE: u64 = 2_000_000;

/// Lovelace placed on each participant's initial output.
pub const INITIAL_OUTPUT_LOVELACE: u64 = 2_000_000;

#[derive(Debug, Error)]
pub enum InitializeError {
    #[error("cannot initialise a head without parties")]
    NoParticipants,
    #[error("{keys} participant keys for {parties} parties")]
    ParticipantKeyMismatch { parties: usize, keys: usize },
    #[error("canonical encoding error: {0}")]
    Canonical(#[from] CanonicalError),
}

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("user utxo would spend an input controlled by the node wallet")]
    SpendingNodeUtxoForbidden,
    #[error("no initial output for our participant in head {head_id}")]
    NoInitialOutput { head_id: HeadId },
    #[error("canonical encoding error: {0}")]
    Canonical(#[from] CanonicalError),
}

#[derive(Debug, Error)]
pub enum AbortError {
    #[error("head {head_id} is not in the initial phase")]
    HeadNotInitial { head_id: HeadId },
    #[error("canonical encoding error: {0}")]
    Canonical(#[from] CanonicalError),
}

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("head {head_id} is not in the initial phase")]
    HeadNotInitial { head_id: HeadId },
    #[error("{got} commits present, {expected} parties expected")]
    MissingCommits { expected: usize, got: usize },
    #[error("committed utxo sets overlap on input {input}")]
    OverlappingCommits { input: TxIn },
    #[error("canonical encoding error: {0}")]
    Canonical(#[from] CanonicalError),
}

#[derive(Debug, Error)]
pub enum CloseError {
    #[error("head {head_id} is not open")]
    HeadNotOpen { head_id: HeadId },
    #[error("canonical encoding error: {0}")]
    Canonical(#[from] CanonicalError),
}

#[derive(Debug, Error)]
pub enum ContestError {
    #[error("head {head_id} is not closed")]
    HeadNotClosed { head_id: HeadId },
    #[error("snapshot {proposed} does not supersede closed snapshot {current}")]
    SnapshotNotNewer {
        current: SnapshotNumber,
        proposed: SnapshotNumber,
    },
    #[error("contestation deadline has passed")]
    DeadlinePassed {
        deadline: ChainTime,
        now: ChainTime,
    },
    #[error("canonical encoding error: {0}")]
    Canonical(#[from] CanonicalError),
}

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("head {head_id} is not closed")]
    HeadNotClosed { head_id: HeadId },
    #[error("canonical encoding error: {0}")]
    Canonical(#[from] CanonicalError),
}

/// Locate the head thread output for `head_id` in the tracked UTxO.
pub fn find_thread_output(
    ctx: &ChainContext,
    utxo: &UTxO,
    head_id: HeadId,
) -> Option<(TxIn, TxOut, HeadDatum)> {
    let address = ctx.scripts.head_address(ctx.network);
    utxo.iter().find_map(|(input, output)| {
        if output.address != address {
            return None;
        }
        match OutputDatum::decode(output.datum.as_ref()?) {
            Some(OutputDatum::Head(datum)) if datum.head_id() == head_id => {
                Some((*input, output.clone(), datum))
            }
            _ => None,
        }
    })
}

/// All initial outputs of `head_id` in the tracked UTxO, in input order.
pub fn find_initial_outputs(
    ctx: &ChainContext,
    utxo: &UTxO,
    head_id: HeadId,
) -> Vec<(TxIn, TxOut, InitialDatum)> {
    let address = ctx.scripts.initial_address(ctx.network);
    utxo.iter()
        .filter_map(|(input, output)| {
            if output.address != address {
                return None;
            }
            match OutputDatum::decode(output.datum.as_ref()?) {
                Some(OutputDatum::Initial(datum)) if datum.head_id == head_id => {
                    Some((*input, output.clone(), datum))
                }
                _ => None,
            }
        })
        .collect()
}

/// All commit outputs of `head_id` in the tracked UTxO, in input order.
pub fn find_commit_outputs(
    ctx: &ChainContext,
    utxo: &UTxO,
    head_id: HeadId,
) -> Vec<(TxIn, TxOut, CommitDatum)> {
    let address = ctx.scripts.commit_address(ctx.network);
    utxo.iter()
        .filter_map(|(input, output)| {
            if output.address != address {
                return None;
            }
            match OutputDatum::decode(output.datum.as_ref()?) {
                Some(OutputDatum::Commit(datum)) if datum.head_id == head_id => {
                    Some((*input, output.clone(), datum))
                }
                _ => None,
            }
        })
        .collect()
}

fn script_redeemer(
    body: &TxBody,
    input: &TxIn,
    redeemer: HeadRedeemer,
) -> Result<Redeemer, CanonicalError> {
    // Inputs are sorted before pointers are assigned, so the index exists.
    let index = body.input_index(input).unwrap_or(0);
    Ok(Redeemer {
        ptr: RedeemerPtr(index),
        data: redeemer.encode()?,
        ex_units: SCRIPT_SPEND_BUDGET,
    })
}

fn attach_redeemers(
    mut body: TxBody,
    script_inputs: &[TxIn],
    redeemer: HeadRedeemer,
) -> Result<TxBody, CanonicalError> {
    let mut redeemers = Vec::with_capacity(script_inputs.len());
    for input in script_inputs {
        redeemers.push(script_redeemer(&body, input, redeemer)?);
    }
    redeemers.sort_by_key(|r| r.ptr);
    body.redeemers = redeemers;
    Ok(body)
}

/// Create the head: one thread output carrying the parameters plus one
/// initial output per participant, consuming the seed input.
pub fn initialize(
    ctx: &ChainContext,
    params: &HeadParameters,
    participant_keys: &[VerificationKey],
    seed_input: TxIn,
) -> Result<Tx, InitializeError> {
    if params.parties.is_empty() {
        return Err(InitializeError::NoParticipants);
    }
    if params.parties.len() != participant_keys.len() {
        return Err(InitializeError::ParticipantKeyMismatch {
            parties: params.parties.len(),
            keys: participant_keys.len(),
        });
    }

    let head_id = HeadId::from_seed(&seed_input)?;
    let seed = HeadSeed::from_tx_in(&seed_input)?;

    let thread = TxOut::new(
        ctx.scripts.head_address(ctx.network),
        THREAD_OUTPUT_LOVELACE,
    )
    .with_datum(
        OutputDatum::Head(HeadDatum::Initial {
            head_id,
            seed,
            parties: params.parties.clone(),
            contestation_period: params.contestation_period,
        })
        .encode()?,
    );

    let mut outputs = vec![thread];
    for (party, key) in params.parties.iter().zip(participant_keys) {
        outputs.push(
            TxOut::new(
                ctx.scripts.initial_address(ctx.network),
                INITIAL_OUTPUT_LOVELACE,
            )
            .with_datum(
                OutputDatum::Initial(InitialDatum {
                    head_id,
                    participant: key.credential(),
                    party: *party,
                })
                .encode()?,
            ),
        );
    }

    Ok(Tx::unsigned(TxBody::new(vec![seed_input], outputs)))
}

/// Spend our initial output and lock `user_utxo` into a commit output.
///
/// Refuses to spend anything the node wallet controls: fuel must never be
/// double counted as a commit.
pub fn commit(
    ctx: &ChainContext,
    head_id: HeadId,
    head_utxo: &UTxO,
    wallet_utxo: &UTxO,
    user_utxo: &UTxO,
) -> Result<Tx, CommitError> {
    if !user_utxo.is_disjoint(wallet_utxo) {
        return Err(CommitError::SpendingNodeUtxoForbidden);
    }

    let (initial_input, initial_output, _) = find_initial_outputs(ctx, head_utxo, head_id)
        .into_iter()
        .find(|(_, _, datum)| datum.participant == ctx.participant)
        .ok_or(CommitError::NoInitialOutput { head_id })?;

    let commit_value = initial_output
        .value
        .saturating_add(user_utxo.total_value());
    let commit_output = TxOut::new(ctx.scripts.commit_address(ctx.network), commit_value)
        .with_datum(
            OutputDatum::Commit(CommitDatum {
                head_id,
                party: ctx.party,
                committed: user_utxo.clone(),
            })
            .encode()?,
        );

    let mut inputs = vec![initial_input];
    inputs.extend(user_utxo.inputs().copied());
    let body = TxBody::new(inputs, vec![commit_output]);
    let body = attach_redeemers(body, &[initial_input], HeadRedeemer::Commit)?;
    Ok(Tx::unsigned(body))
}

/// Tear the head down while still in the initial phase: refund every
/// committed UTxO to its owner and burn the thread output.
pub fn abort(
    ctx: &ChainContext,
    seed_input: TxIn,
    head_utxo: &UTxO,
) -> Result<Tx, AbortError> {
    let head_id = HeadId::from_seed(&seed_input)?;
    let (thread_input, _, datum) = find_thread_output(ctx, head_utxo, head_id)
        .ok_or(AbortError::HeadNotInitial { head_id })?;
    if !matches!(datum, HeadDatum::Initial { .. }) {
        return Err(AbortError::HeadNotInitial { head_id });
    }

    let initials = find_initial_outputs(ctx, head_utxo, head_id);
    let commits = find_commit_outputs(ctx, head_utxo, head_id);

    let mut script_inputs = vec![thread_input];
    script_inputs.extend(initials.iter().map(|(input, _, _)| *input));
    script_inputs.extend(commits.iter().map(|(input, _, _)| *input));

    let mut outputs = Vec::new();
    for (_, _, commit_datum) in &commits {
        for (_, refunded) in commit_datum.committed.iter() {
            outputs.push(refunded.clone());
        }
    }

    let body = TxBody::new(script_inputs.clone(), outputs);
    let body = attach_redeemers(body, &script_inputs, HeadRedeemer::Abort)?;
    Ok(Tx::unsigned(body))
}

/// Consume all commit outputs plus the thread and open the head over the
/// union of everything committed.
pub fn collect(
    ctx: &ChainContext,
    head_utxo: &UTxO,
    head_id: HeadId,
) -> Result<Tx, CollectError> {
    let (thread_input, thread_output, datum) = find_thread_output(ctx, head_utxo, head_id)
        .ok_or(CollectError::HeadNotInitial { head_id })?;
    let (parties, contestation_period) = match &datum {
        HeadDatum::Initial {
            parties,
            contestation_period,
            ..
        } => (parties.clone(), *contestation_period),
        _ => return Err(CollectError::HeadNotInitial { head_id }),
    };

    let commits = find_commit_outputs(ctx, head_utxo, head_id);
    if commits.len() != parties.len() {
        return Err(CollectError::MissingCommits {
            expected: parties.len(),
            got: commits.len(),
        });
    }

    let mut initial_utxo = UTxO::new();
    let mut collected_value = thread_output.value;
    for (_, commit_output, commit_datum) in &commits {
        collected_value = collected_value.saturating_add(commit_output.value);
        for (input, output) in commit_datum.committed.iter() {
            if initial_utxo.insert(*input, output.clone()).is_some() {
                return Err(CollectError::OverlappingCommits { input: *input });
            }
        }
    }

    let new_thread = TxOut::new(ctx.scripts.head_address(ctx.network), collected_value)
        .with_datum(
            OutputDatum::Head(HeadDatum::Open {
                head_id,
                parties,
                contestation_period,
                utxo: initial_utxo,
            })
            .encode()?,
        );

    let mut script_inputs = vec![thread_input];
    script_inputs.extend(commits.iter().map(|(input, _, _)| *input));
    let body = TxBody::new(script_inputs.clone(), vec![new_thread]);
    let body = attach_redeemers(body, &script_inputs, HeadRedeemer::Collect)?;
    Ok(Tx::unsigned(body))
}

/// Close the head with the given snapshot. The validity interval is
/// `[current_slot, upper_slot]` and the recorded contestation deadline is
/// `upper_time + cp`.
#[allow(clippy::too_many_arguments)]
pub fn close(
    ctx: &ChainContext,
    head_utxo: &UTxO,
    head_id: HeadId,
    snapshot: &Snapshot,
    current_slot: ChainSlot,
    upper_slot: ChainSlot,
    upper_time: ChainTime,
) -> Result<Tx, CloseError> {
    let (thread_input, thread_output, datum) = find_thread_output(ctx, head_utxo, head_id)
        .ok_or(CloseError::HeadNotOpen { head_id })?;
    let (parties, contestation_period, open_utxo) = match datum {
        HeadDatum::Open {
            parties,
            contestation_period,
            utxo,
            ..
        } => (parties, contestation_period, utxo),
        _ => return Err(CloseError::HeadNotOpen { head_id }),
    };

    // Snapshot 0 closes over the collected UTxO; anything newer closes over
    // the snapshot's agreed set.
    let closing_utxo = if snapshot.number == SnapshotNumber(0) {
        open_utxo
    } else {
        snapshot.utxo.clone()
    };
    let contestation_deadline =
        upper_time.saturating_add_millis(contestation_period.as_millis());

    let new_thread = TxOut::new(ctx.scripts.head_address(ctx.network), thread_output.value)
        .with_datum(
            OutputDatum::Head(HeadDatum::Closed {
                head_id,
                parties,
                contestation_period,
                snapshot_number: snapshot.number,
                utxo: closing_utxo,
                contestation_deadline,
            })
            .encode()?,
        );

    let mut body = TxBody::new(vec![thread_input], vec![new_thread]);
    body.validity = ValidityRange::between(current_slot, upper_slot);
    let body = attach_redeemers(body, &[thread_input], HeadRedeemer::Close)?;
    Ok(Tx::unsigned(body))
}

/// Contest a close with a strictly newer snapshot, extending the deadline
/// by one contestation period.
pub fn contest(
    ctx: &ChainContext,
    head_utxo: &UTxO,
    head_id: HeadId,
    snapshot: &Snapshot,
    upper_slot: ChainSlot,
    upper_time: ChainTime,
) -> Result<Tx, ContestError> {
    let (thread_input, thread_output, datum) = find_thread_output(ctx, head_utxo, head_id)
        .ok_or(ContestError::HeadNotClosed { head_id })?;
    let (parties, contestation_period, closed_number, contestation_deadline) = match datum {
        HeadDatum::Closed {
            parties,
            contestation_period,
            snapshot_number,
            contestation_deadline,
            ..
        } => (
            parties,
            contestation_period,
            snapshot_number,
            contestation_deadline,
        ),
        _ => return Err(ContestError::HeadNotClosed { head_id }),
    };

    if snapshot.number <= closed_number {
        return Err(ContestError::SnapshotNotNewer {
            current: closed_number,
            proposed: snapshot.number,
        });
    }
    if upper_time > contestation_deadline {
        return Err(ContestError::DeadlinePassed {
            deadline: contestation_deadline,
            now: upper_time,
        });
    }

    let extended_deadline =
        contestation_deadline.saturating_add_millis(contestation_period.as_millis());

    let new_thread = TxOut::new(ctx.scripts.head_address(ctx.network), thread_output.value)
        .with_datum(
            OutputDatum::Head(HeadDatum::Closed {
                head_id,
                parties,
                contestation_period,
                snapshot_number: snapshot.number,
                utxo: snapshot.utxo.clone(),
                contestation_deadline: extended_deadline,
            })
            .encode()?,
        );

    let mut body = TxBody::new(vec![thread_input], vec![new_thread]);
    body.validity = ValidityRange {
        lower: None,
        upper: Some(upper_slot),
    };
    let body = attach_redeemers(body, &[thread_input], HeadRedeemer::Contest)?;
    Ok(Tx::unsigned(body))
}

/// Distribute the closed head's UTxO back to layer 1. Only valid from the
/// contestation deadline onward, which the validity lower bound encodes.
pub fn fanout(
    ctx: &ChainContext,
    head_utxo: &UTxO,
    head_id: HeadId,
    deadline_slot: ChainSlot,
) -> Result<Tx, FanoutError> {
    let (thread_input, _, datum) = find_thread_output(ctx, head_utxo, head_id)
        .ok_or(FanoutError::HeadNotClosed { head_id })?;
    let fanned_out = match datum {
        HeadDatum::Closed { utxo, .. } => utxo,
        _ => return Err(FanoutError::HeadNotClosed { head_id }),
    };

    let outputs: Vec<TxOut> = fanned_out
        .iter()
        .map(|(_, output)| output.clone())
        .collect();

    let mut body = TxBody::new(vec![thread_input], outputs);
    body.validity = ValidityRange::from_slot(deadline_slot);
    let body = attach_redeemers(body, &[thread_input], HeadRedeemer::Fanout)?;
    Ok(Tx::unsigned(body))
}

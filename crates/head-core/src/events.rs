//! The boundary types exchanged with the node core.
//!
//! `PostChainTx` flows downward (node core asks the chain layer to post a
//! protocol transaction), `OnChainTx` and `ChainEvent` flow upward (the
//! chain layer reports what it observed). These are stable contracts.

use crate::canonical::Hash32;
use crate::chain::{ChainSlot, ChainStateAt, ChainTime};
use crate::keys::VerificationKey;
use crate::tx::RedeemerPtr;
use crate::utxo::UTxO;
use crate::{HeadId, HeadParameters, HeadSeed, Party, Snapshot, SnapshotNumber};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A request to advance the head on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostChainTx {
    InitTx {
        params: HeadParameters,
        /// On-chain verification keys of all participants, in party order.
        participant_keys: Vec<VerificationKey>,
    },
    AbortTx {
        utxo: UTxO,
        head_seed: HeadSeed,
    },
    CollectComTx {
        head_id: HeadId,
    },
    CloseTx {
        head_id: HeadId,
        head_seed: HeadSeed,
        head_parameters: HeadParameters,
        confirmed_snapshot: Snapshot,
    },
    ContestTx {
        head_id: HeadId,
        confirmed_snapshot: Snapshot,
    },
    FanoutTx {
        utxo: UTxO,
        contestation_deadline: ChainTime,
    },
}

impl PostChainTx {
    /// Short tag for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            PostChainTx::InitTx { .. } => "InitTx",
            PostChainTx::AbortTx { .. } => "AbortTx",
            PostChainTx::CollectComTx { .. } => "CollectComTx",
            PostChainTx::CloseTx { .. } => "CloseTx",
            PostChainTx::ContestTx { .. } => "ContestTx",
            PostChainTx::FanoutTx { .. } => "FanoutTx",
        }
    }
}

/// A head lifecycle transition recognised on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnChainTx {
    OnInitTx {
        head_id: HeadId,
        head_seed: HeadSeed,
        contestation_period: crate::ContestationPeriod,
        parties: Vec<Party>,
    },
    OnCommitTx {
        head_id: HeadId,
        party: Party,
        committed: UTxO,
    },
    OnAbortTx {
        head_id: HeadId,
    },
    OnCollectComTx {
        head_id: HeadId,
        utxo: UTxO,
    },
    OnCloseTx {
        head_id: HeadId,
        snapshot_number: SnapshotNumber,
        contestation_deadline: ChainTime,
    },
    OnContestTx {
        head_id: HeadId,
        snapshot_number: SnapshotNumber,
    },
    OnFanoutTx {
        head_id: HeadId,
    },
}

impl OnChainTx {
    pub fn kind(&self) -> &'static str {
        match self {
            OnChainTx::OnInitTx { .. } => "OnInitTx",
            OnChainTx::OnCommitTx { .. } => "OnCommitTx",
            OnChainTx::OnAbortTx { .. } => "OnAbortTx",
            OnChainTx::OnCollectComTx { .. } => "OnCollectComTx",
            OnChainTx::OnCloseTx { .. } => "OnCloseTx",
            OnChainTx::OnContestTx { .. } => "OnContestTx",
            OnChainTx::OnFanoutTx { .. } => "OnFanoutTx",
        }
    }
}

/// An event emitted upward by the chain layer, in chain order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainEvent {
    Observation {
        observed_tx: OnChainTx,
        new_chain_state: ChainStateAt,
    },
    Rollback {
        rolled_back_chain_state: ChainStateAt,
    },
    Tick {
        chain_time: ChainTime,
        chain_slot: ChainSlot,
    },
}

/// Strictly monotonically increasing id assigned to queued events.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct EventId(pub u64);

/// A `ChainEvent` stamped with its queue id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEventEnvelope {
    pub id: EventId,
    pub event: ChainEvent,
}

/// Why a `post_tx` request could not be turned into a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PostTxError {
    #[error("wallet holds no input usable as a head seed")]
    NoSeedInput,
    #[error("head seed does not decode to a transaction input")]
    InvalidSeed { head_seed: HeadSeed },
    #[error("wallet holds no fuel marked output")]
    NoFuelUTXOFound,
    #[error("not enough fuel to cover the transaction")]
    NotEnoughFuel,
    #[error("script execution failed in wallet at {redeemer_ptr:?}: {failure_reason}")]
    ScriptFailedInWallet {
        redeemer_ptr: RedeemerPtr,
        failure_reason: String,
    },
    #[error("internal wallet error: {reason}")]
    InternalWalletError {
        head_utxo: UTxO,
        reason: String,
        tx: Option<crate::tx::Tx>,
    },
    #[error("failed to construct init transaction: {reason}")]
    FailedToConstructInitTx { reason: String },
    #[error("failed to construct abort transaction: {reason}")]
    FailedToConstructAbortTx { reason: String },
    #[error("failed to construct collect transaction: {reason}")]
    FailedToConstructCollectTx { reason: String },
    #[error("failed to construct close transaction: {reason}")]
    FailedToConstructCloseTx { reason: String },
    #[error("failed to construct contest transaction: {reason}")]
    FailedToConstructContestTx { reason: String },
    #[error("failed to construct fanout transaction: {reason}")]
    FailedToConstructFanoutTx { reason: String },
    #[error("user utxo would spend an input controlled by the node wallet")]
    SpendingNodeUtxoForbidden,
    #[error("time conversion failed: {reason}")]
    TimeConversionFailed { reason: String },
    #[error("submission failed: {reason}")]
    FailedToPostTx { tx_id: Hash32, reason: String },
}

//! Structured log events of the chain layer.
//!
//! `DirectChainLog` is a serialisable record of everything the layer does;
//! the JSON shape (a `"tag"` discriminator plus named fields) is a tested
//! contract. Emission goes through `tracing` with the serialised event as
//! a structured field.

use head_core::canonical::Hash32;
use head_core::chain::{ChainPoint, ChainSlot};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// One loggable situation in the chain layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tag")]
pub enum DirectChainLog {
    ToPost {
        tx_kind: String,
    },
    PostingTx {
        tx_id: Hash32,
    },
    PostedTx {
        tx_id: Hash32,
    },
    PostingFailed {
        tx_id: Hash32,
        reason: String,
    },
    RolledForward {
        point: ChainPoint,
        tx_ids: Vec<Hash32>,
    },
    RolledBackward {
        point: ChainPoint,
    },
    ObservedTx {
        tx_id: Hash32,
        kind: String,
    },
    TimeConversionFailed {
        slot: ChainSlot,
        reason: String,
    },
    RollbackBeyondAnchor {
        requested_slot: ChainSlot,
        anchor_slot: ChainSlot,
    },
    WalletUpdated {
        utxo_count: u64,
    },
}

/// Titles of every log constructor, in declaration order. The schema the
/// JSON shape test validates against.
pub const LOG_SCHEMA_TITLES: &[&str] = &[
    "ToPost",
    "PostingTx",
    "PostedTx",
    "PostingFailed",
    "RolledForward",
    "RolledBackward",
    "ObservedTx",
    "TimeConversionFailed",
    "RollbackBeyondAnchor",
    "WalletUpdated",
];

impl DirectChainLog {
    /// The `tag` this variant serialises with.
    pub fn tag(&self) -> &'static str {
        match self {
            DirectChainLog::ToPost { .. } => "ToPost",
            DirectChainLog::PostingTx { .. } => "PostingTx",
            DirectChainLog::PostedTx { .. } => "PostedTx",
            DirectChainLog::PostingFailed { .. } => "PostingFailed",
            DirectChainLog::RolledForward { .. } => "RolledForward",
            DirectChainLog::RolledBackward { .. } => "RolledBackward",
            DirectChainLog::ObservedTx { .. } => "ObservedTx",
            DirectChainLog::TimeConversionFailed { .. } => "TimeConversionFailed",
            DirectChainLog::RollbackBeyondAnchor { .. } => "RollbackBeyondAnchor",
            DirectChainLog::WalletUpdated { .. } => "WalletUpdated",
        }
    }

    /// Emit through `tracing` at a severity matching the situation.
    pub fn emit(&self) {
        let payload = serde_json::to_string(self).unwrap_or_else(|_| self.tag().to_string());
        match self {
            DirectChainLog::PostingFailed { .. }
            | DirectChainLog::TimeConversionFailed { .. }
            | DirectChainLog::RollbackBeyondAnchor { .. } => {
                warn!(target: "head_chain", event = %payload, "chain layer event");
            }
            DirectChainLog::RolledForward { .. } | DirectChainLog::WalletUpdated { .. } => {
                debug!(target: "head_chain", event = %payload, "chain layer event");
            }
            _ => {
                info!(target: "head_chain", event = %payload, "chain layer event");
            }
        }
    }
}

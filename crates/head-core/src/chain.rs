//! Chain position, chain time and the rollback-capable state history.

use crate::canonical::Hash32;
use crate::utxo::UTxO;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A slot number on the layer-1 chain.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ChainSlot(pub u64);

impl std::fmt::Display for ChainSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wall-clock time as milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ChainTime(pub u64);

impl ChainTime {
    pub fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    pub fn as_millis(self) -> u64 {
        self.0
    }

    pub fn saturating_add_millis(self, ms: u64) -> Self {
        Self(self.0.saturating_add(ms))
    }
}

/// A chain point: slot plus block hash. The unit of sync and rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainPoint {
    pub slot: ChainSlot,
    pub block_hash: Hash32,
}

impl ChainPoint {
    pub fn new(slot: ChainSlot, block_hash: Hash32) -> Self {
        Self { slot, block_hash }
    }
}

impl std::fmt::Display for ChainPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.slot, self.block_hash)
    }
}

/// The head-relevant UTxO slice as of a chain point.
///
/// `recorded_at` is `None` only for the genesis/initial state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStateAt {
    pub utxo: UTxO,
    pub recorded_at: Option<ChainPoint>,
}

impl ChainStateAt {
    /// The initial state before anything was observed.
    pub fn genesis() -> Self {
        Self {
            utxo: UTxO::new(),
            recorded_at: None,
        }
    }

    /// Slot of this state; genesis sorts before every real slot.
    pub fn slot(&self) -> ChainSlot {
        self.recorded_at.map(|p| p.slot).unwrap_or(ChainSlot(0))
    }
}

/// Errors from history manipulation.
#[derive(Debug, Error)]
pub enum ChainStateError {
    #[error("new state at slot {new} does not advance past current slot {current}")]
    NonMonotonicPush { current: ChainSlot, new: ChainSlot },
}

/// An ordered, non-empty sequence of chain states, newest last.
///
/// The first entry is the pinned safety anchor: rollbacks never drop it, and
/// a rollback request older than it is answered with the anchor itself.
/// Slots are strictly increasing; same-slot updates (several head
/// transactions inside one block) coalesce into the newest entry so the
/// invariant holds across multi-transaction blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStateHistory {
    states: Vec<ChainStateAt>,
}

impl ChainStateHistory {
    /// A history rooted at the given anchor state.
    pub fn rooted_at(anchor: ChainStateAt) -> Self {
        Self {
            states: vec![anchor],
        }
    }

    pub fn current(&self) -> &ChainStateAt {
        // Non-empty by construction.
        self.states.last().unwrap_or_else(|| unreachable!())
    }

    pub fn anchor(&self) -> &ChainStateAt {
        self.states.first().unwrap_or_else(|| unreachable!())
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn states(&self) -> &[ChainStateAt] {
        &self.states
    }

    /// Append a state. The slot must be `>=` the current slot; an equal slot
    /// replaces the newest entry, a greater slot extends the history.
    pub fn push(&mut self, state: ChainStateAt) -> Result<(), ChainStateError> {
        let current_slot = self.current().slot();
        let new_slot = state.slot();
        if self.current().recorded_at.is_some() && new_slot < current_slot {
            return Err(ChainStateError::NonMonotonicPush {
                current: current_slot,
                new: new_slot,
            });
        }
        if self.current().recorded_at.is_some() && new_slot == current_slot {
            if self.states.len() == 1 {
                // Never overwrite the anchor in place; extend instead.
                self.states.push(state);
            } else {
                *self.states.last_mut().unwrap_or_else(|| unreachable!()) = state;
            }
            return Ok(());
        }
        self.states.push(state);
        Ok(())
    }

    /// Drop every entry recorded after `to_slot` and return the new current
    /// state. Requests older than the anchor return the anchor unchanged.
    /// Idempotent.
    pub fn rollback(&mut self, to_slot: ChainSlot) -> ChainStateAt {
        while self.states.len() > 1 {
            let newest_slot = self.current().slot();
            if newest_slot > to_slot {
                self.states.pop();
            } else {
                break;
            }
        }
        self.current().clone()
    }
}

//! The process-wide mutable chain state for one head.
//!
//! A single owner object wraps the history behind a mutex and exposes only
//! bounded operations. Every operation locks once and never suspends while
//! holding the lock, so readers always see a consistent snapshot and the
//! observer's read-modify-write is one atomic step.

use head_core::chain::{ChainSlot, ChainStateAt, ChainStateError, ChainStateHistory};
use std::sync::Mutex;

/// The capability consumers need from a chain state: read the current
/// state, push a newer one, rewind. Components program against this seam
/// instead of the owner object.
pub trait IsChainState: Send + Sync {
    fn current_state(&self) -> ChainStateAt;
    fn push_new_state(&self, state: ChainStateAt) -> Result<(), ChainStateError>;
    fn rollback_history(&self, to_slot: ChainSlot) -> ChainStateAt;
}

/// Mutable, rollback-capable history of chain states. Single writer,
/// many readers.
pub struct LocalChainState {
    history: Mutex<ChainStateHistory>,
}

impl LocalChainState {
    /// Start from a genesis state.
    pub fn new() -> Self {
        Self::from_history(ChainStateHistory::rooted_at(ChainStateAt::genesis()))
    }

    /// Start from a recovered history, e.g. after restart.
    pub fn from_history(history: ChainStateHistory) -> Self {
        Self {
            history: Mutex::new(history),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChainStateHistory> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The newest chain state.
    pub fn get_latest(&self) -> ChainStateAt {
        self.lock().current().clone()
    }

    /// Slot of the pinned safety anchor.
    pub fn anchor_slot(&self) -> ChainSlot {
        self.lock().anchor().slot()
    }

    /// Append a new state. Slots must not move backwards.
    pub fn push_new(&self, state: ChainStateAt) -> Result<(), ChainStateError> {
        self.lock().push(state)
    }

    /// Drop every state recorded after `to_slot` and return the new current
    /// state. Never rolls past the anchor; idempotent.
    pub fn rollback(&self, to_slot: ChainSlot) -> ChainStateAt {
        self.lock().rollback(to_slot)
    }

    /// A copy of the whole history, newest last.
    pub fn history(&self) -> ChainStateHistory {
        self.lock().clone()
    }

    /// Atomic read-modify-write: run `f` on the latest state and push its
    /// result, all under one lock. `f` returning `None` leaves the history
    /// untouched. This is how the observer keeps its output and the stored
    /// state in agreement.
    pub fn try_advance<T>(
        &self,
        f: impl FnOnce(&ChainStateAt) -> Option<(ChainStateAt, T)>,
    ) -> Result<Option<(ChainStateAt, T)>, ChainStateError> {
        let mut history = self.lock();
        match f(history.current()) {
            Some((next, extra)) => {
                history.push(next.clone())?;
                Ok(Some((next, extra)))
            }
            None => Ok(None),
        }
    }
}

impl Default for LocalChainState {
    fn default() -> Self {
        Self::new()
    }
}

impl IsChainState for LocalChainState {
    fn current_state(&self) -> ChainStateAt {
        self.get_latest()
    }

    fn push_new_state(&self, state: ChainStateAt) -> Result<(), ChainStateError> {
        self.push_new(state)
    }

    fn rollback_history(&self, to_slot: ChainSlot) -> ChainStateAt {
        self.rollback(to_slot)
    }
}

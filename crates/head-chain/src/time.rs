//! Slot and wall-clock conversion through a cached era history.
//!
//! The era history is a summary of windows with known slot lengths. A
//! handle can only interpret slots and times inside the summarised span;
//! anything beyond it fails with `PastHorizon` and the caller must acquire
//! a fresh handle. Handles are therefore cheap values produced by an
//! injected `GetTimeHandle` so no user-visible deadline is ever computed
//! from a stale cache.

use head_core::chain::{ChainSlot, ChainTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// One era window with a constant slot length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EraSummary {
    pub start_slot: ChainSlot,
    pub start_time: ChainTime,
    /// First slot after this era; the horizon when this is the last era.
    pub end_slot: ChainSlot,
    pub slot_length_millis: u64,
}

impl EraSummary {
    fn contains_slot(&self, slot: ChainSlot) -> bool {
        slot >= self.start_slot && slot < self.end_slot
    }

    fn end_time(&self) -> ChainTime {
        let slots = self.end_slot.0.saturating_sub(self.start_slot.0);
        self.start_time
            .saturating_add_millis(slots.saturating_mul(self.slot_length_millis))
    }

    fn contains_time(&self, time: ChainTime) -> bool {
        time >= self.start_time && time < self.end_time()
    }
}

/// The cached era history backing a time handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EraHistory {
    eras: Vec<EraSummary>,
}

#[derive(Debug, Error)]
pub enum TimeHandleError {
    #[error("slot {slot} is past the era history horizon")]
    PastHorizon { slot: ChainSlot },
    #[error("time {time:?} is past the era history horizon")]
    TimePastHorizon { time: ChainTime },
    #[error("era history is empty")]
    EmptyHistory,
}

impl EraHistory {
    /// Build a history from era summaries. Eras must be contiguous and in
    /// ascending order; the constructor trusts the cache that produced them.
    pub fn new(eras: Vec<EraSummary>) -> Self {
        Self { eras }
    }

    /// A single-era history starting at the genesis of time: slot 0 at
    /// `system_start`, fixed slot length, horizon after `horizon_slots`.
    pub fn single_era(
        system_start: ChainTime,
        slot_length_millis: u64,
        horizon_slots: u64,
    ) -> Self {
        Self::new(vec![EraSummary {
            start_slot: ChainSlot(0),
            start_time: system_start,
            end_slot: ChainSlot(horizon_slots),
            slot_length_millis,
        }])
    }

    pub fn slot_to_time(&self, slot: ChainSlot) -> Result<ChainTime, TimeHandleError> {
        if self.eras.is_empty() {
            return Err(TimeHandleError::EmptyHistory);
        }
        let era = self
            .eras
            .iter()
            .find(|era| era.contains_slot(slot))
            .ok_or(TimeHandleError::PastHorizon { slot })?;
        let elapsed = slot.0.saturating_sub(era.start_slot.0);
        Ok(era
            .start_time
            .saturating_add_millis(elapsed.saturating_mul(era.slot_length_millis)))
    }

    pub fn time_to_slot(&self, time: ChainTime) -> Result<ChainSlot, TimeHandleError> {
        if self.eras.is_empty() {
            return Err(TimeHandleError::EmptyHistory);
        }
        let era = self
            .eras
            .iter()
            .find(|era| era.contains_time(time))
            .ok_or(TimeHandleError::TimePastHorizon { time })?;
        let elapsed_millis = time.as_millis().saturating_sub(era.start_time.as_millis());
        let slots = if era.slot_length_millis == 0 {
            0
        } else {
            elapsed_millis / era.slot_length_millis
        };
        Ok(ChainSlot(era.start_slot.0.saturating_add(slots)))
    }
}

/// A snapshot of the era history plus the wall clock at acquisition.
#[derive(Debug, Clone)]
pub struct TimeHandle {
    history: EraHistory,
    now: ChainTime,
}

impl TimeHandle {
    pub fn new(history: EraHistory, now: ChainTime) -> Self {
        Self { history, now }
    }

    /// The current slot and its wall-clock time.
    pub fn current_point_in_time(&self) -> Result<(ChainSlot, ChainTime), TimeHandleError> {
        let slot = self.history.time_to_slot(self.now)?;
        Ok((slot, self.now))
    }

    pub fn slot_from_utc(&self, time: ChainTime) -> Result<ChainSlot, TimeHandleError> {
        self.history.time_to_slot(time)
    }

    pub fn slot_to_utc(&self, slot: ChainSlot) -> Result<ChainTime, TimeHandleError> {
        self.history.slot_to_time(slot)
    }

    pub fn now(&self) -> ChainTime {
        self.now
    }
}

/// Produces a fresh handle on demand. Acquisition may read a cache and is
/// allowed to fail when the cache cannot be refreshed.
pub type GetTimeHandle =
    Arc<dyn Fn() -> Result<TimeHandle, TimeHandleError> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> EraHistory {
        // Slot 0 at t=1_000_000 ms, one-second slots, horizon at slot 1000.
        EraHistory::single_era(ChainTime::from_millis(1_000_000), 1_000, 1_000)
    }

    #[test]
    fn slot_and_time_convert_both_ways() {
        let history = history();
        let time = history.slot_to_time(ChainSlot(10)).unwrap();
        assert_eq!(time, ChainTime::from_millis(1_010_000));
        assert_eq!(history.time_to_slot(time).unwrap(), ChainSlot(10));
    }

    #[test]
    fn mid_slot_times_round_down() {
        let history = history();
        let slot = history
            .time_to_slot(ChainTime::from_millis(1_010_700))
            .unwrap();
        assert_eq!(slot, ChainSlot(10));
    }

    #[test]
    fn slots_past_the_horizon_fail() {
        let history = history();
        let err = history.slot_to_time(ChainSlot(1_000));
        assert!(matches!(
            err,
            Err(TimeHandleError::PastHorizon { slot: ChainSlot(1_000) })
        ));
    }

    #[test]
    fn times_past_the_horizon_fail() {
        let history = history();
        let err = history.time_to_slot(ChainTime::from_millis(2_000_000));
        assert!(matches!(err, Err(TimeHandleError::TimePastHorizon { .. })));
    }

    #[test]
    fn multi_era_histories_switch_slot_lengths() {
        // Era 1: 1s slots for 100 slots; era 2: 2s slots afterwards.
        let history = EraHistory::new(vec![
            EraSummary {
                start_slot: ChainSlot(0),
                start_time: ChainTime::from_millis(0),
                end_slot: ChainSlot(100),
                slot_length_millis: 1_000,
            },
            EraSummary {
                start_slot: ChainSlot(100),
                start_time: ChainTime::from_millis(100_000),
                end_slot: ChainSlot(200),
                slot_length_millis: 2_000,
            },
        ]);
        assert_eq!(
            history.slot_to_time(ChainSlot(150)).unwrap(),
            ChainTime::from_millis(200_000)
        );
        assert_eq!(
            history.time_to_slot(ChainTime::from_millis(200_000)).unwrap(),
            ChainSlot(150)
        );
    }

    #[test]
    fn handle_reports_current_point_in_time() {
        let handle = TimeHandle::new(history(), ChainTime::from_millis(1_042_000));
        let (slot, time) = handle.current_point_in_time().unwrap();
        assert_eq!(slot, ChainSlot(42));
        assert_eq!(time, ChainTime::from_millis(1_042_000));
    }
}

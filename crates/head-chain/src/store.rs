//! Persistent chain-state history.
//!
//! Records are keyed by big-endian slot so a range scan walks the history
//! in chain order. Each record carries the slot, the block hash and the
//! canonical bytes of the `ChainStateAt`. On startup the newest record at
//! or before the configured safety anchor becomes the recovery point.

use head_core::canonical::{canonical_decode, canonical_encode, CanonicalError, Hash32};
use head_core::chain::{ChainSlot, ChainStateAt, ChainStateHistory};
use serde::{Deserialize, Serialize};
use sled::Tree;
use thiserror::Error;
use tracing::{debug, info};

const RECORDS_TREE: &str = "head_state_records";
const META_TREE: &str = "head_state_meta";
const META_ANCHOR_KEY: &[u8] = b"anchor_slot";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Sled(#[from] sled::Error),
    #[error("canonical encoding error: {0}")]
    Canonical(#[from] CanonicalError),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// One persisted history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StateRecord {
    slot: u64,
    block_hash: Hash32,
    #[serde(with = "serde_bytes")]
    state: Vec<u8>,
}

impl StateRecord {
    fn from_state(state: &ChainStateAt) -> Result<Self, StoreError> {
        let (slot, block_hash) = match state.recorded_at {
            Some(point) => (point.slot.0, point.block_hash),
            None => (0, Hash32::ZERO),
        };
        Ok(Self {
            slot,
            block_hash,
            state: canonical_encode(state)?,
        })
    }

    fn into_state(self) -> Result<ChainStateAt, StoreError> {
        canonical_decode(&self.state).map_err(|e| {
            StoreError::Corrupt(format!("state record at slot {}: {e}", self.slot))
        })
    }
}

/// Sled-backed store for the chain-state history.
pub struct ChainStateStore {
    records: Tree,
    meta: Tree,
}

impl ChainStateStore {
    pub fn open(db: &sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            records: db.open_tree(RECORDS_TREE)?,
            meta: db.open_tree(META_TREE)?,
        })
    }

    /// Persist one state, keyed by its slot.
    pub fn persist(&self, state: &ChainStateAt) -> Result<(), StoreError> {
        let record = StateRecord::from_state(state)?;
        self.records
            .insert(record.slot.to_be_bytes(), canonical_encode(&record)?)?;
        debug!(slot = record.slot, "persisted chain state record");
        Ok(())
    }

    /// Remember the configured safety anchor slot.
    pub fn set_anchor_slot(&self, slot: ChainSlot) -> Result<(), StoreError> {
        self.meta
            .insert(META_ANCHOR_KEY, slot.0.to_be_bytes().to_vec())?;
        Ok(())
    }

    pub fn anchor_slot(&self) -> Result<Option<ChainSlot>, StoreError> {
        let Some(bytes) = self.meta.get(META_ANCHOR_KEY)? else {
            return Ok(None);
        };
        let array: [u8; 8] = bytes
            .as_ref()
            .try_into()
            .map_err(|_| StoreError::Corrupt("anchor slot is not 8 bytes".into()))?;
        Ok(Some(ChainSlot(u64::from_be_bytes(array))))
    }

    /// Drop every record newer than `to_slot`, mirroring a rollback.
    pub fn truncate_after(&self, to_slot: ChainSlot) -> Result<(), StoreError> {
        let start = to_slot.0.saturating_add(1).to_be_bytes();
        let stale: Vec<_> = self
            .records
            .range(start..)
            .keys()
            .collect::<Result<_, _>>()?;
        for key in stale {
            self.records.remove(key)?;
        }
        Ok(())
    }

    /// The newest persisted state with slot `<= anchor`, if any.
    pub fn load_recovery_point(
        &self,
        anchor: ChainSlot,
    ) -> Result<Option<ChainStateAt>, StoreError> {
        let end = anchor.0.saturating_add(1).to_be_bytes();
        let Some(entry) = self.records.range(..end).last() else {
            return Ok(None);
        };
        let (_, value) = entry?;
        let record: StateRecord = canonical_decode(&value)?;
        record.into_state().map(Some)
    }

    /// Rebuild the full history for handler construction: the recovery
    /// point (or genesis) as the pinned anchor, newer records on top.
    pub fn load_or_genesis(&self, anchor: ChainSlot) -> Result<ChainStateHistory, StoreError> {
        let root = self
            .load_recovery_point(anchor)?
            .unwrap_or_else(ChainStateAt::genesis);
        let root_slot = root.slot();
        let mut history = ChainStateHistory::rooted_at(root);

        let start = root_slot.0.saturating_add(1).to_be_bytes();
        for entry in self.records.range(start..) {
            let (_, value) = entry?;
            let record: StateRecord = canonical_decode(&value)?;
            let state = record.into_state()?;
            history
                .push(state)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        }
        info!(
            entries = history.len(),
            anchor = root_slot.0,
            "recovered chain state history"
        );
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use head_core::chain::ChainPoint;
    use head_core::utxo::UTxO;
    use tempfile::tempdir;

    fn state_at(slot: u64, seed: u8) -> ChainStateAt {
        ChainStateAt {
            utxo: UTxO::new(),
            recorded_at: Some(ChainPoint::new(ChainSlot(slot), Hash32([seed; 32]))),
        }
    }

    fn test_store() -> (sled::Db, ChainStateStore) {
        let dir = tempdir().expect("tmpdir");
        let db = sled::open(dir.path()).expect("open db");
        let store = ChainStateStore::open(&db).expect("open store");
        (db, store)
    }

    #[test]
    fn persisted_states_roundtrip() {
        let (_db, store) = test_store();
        let state = state_at(12, 3);
        store.persist(&state).unwrap();

        let recovered = store.load_recovery_point(ChainSlot(100)).unwrap();
        assert_eq!(recovered, Some(state));
    }

    #[test]
    fn recovery_point_respects_the_anchor() {
        let (_db, store) = test_store();
        store.persist(&state_at(10, 1)).unwrap();
        store.persist(&state_at(20, 2)).unwrap();
        store.persist(&state_at(30, 3)).unwrap();

        let recovered = store.load_recovery_point(ChainSlot(25)).unwrap().unwrap();
        assert_eq!(recovered.slot(), ChainSlot(20));
    }

    #[test]
    fn load_or_genesis_rebuilds_the_history() {
        let (_db, store) = test_store();
        store.persist(&state_at(10, 1)).unwrap();
        store.persist(&state_at(20, 2)).unwrap();
        store.persist(&state_at(30, 3)).unwrap();

        let history = store.load_or_genesis(ChainSlot(15)).unwrap();
        assert_eq!(history.anchor().slot(), ChainSlot(10));
        assert_eq!(history.current().slot(), ChainSlot(30));
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn empty_store_recovers_to_genesis() {
        let (_db, store) = test_store();
        let history = store.load_or_genesis(ChainSlot(99)).unwrap();
        assert!(history.current().recorded_at.is_none());
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn truncate_after_mirrors_rollback() {
        let (_db, store) = test_store();
        store.persist(&state_at(10, 1)).unwrap();
        store.persist(&state_at(20, 2)).unwrap();
        store.persist(&state_at(30, 3)).unwrap();

        store.truncate_after(ChainSlot(20)).unwrap();
        let history = store.load_or_genesis(ChainSlot(5)).unwrap();
        assert_eq!(history.current().slot(), ChainSlot(20));
    }

    #[test]
    fn anchor_slot_meta_roundtrips() {
        let (_db, store) = test_store();
        assert_eq!(store.anchor_slot().unwrap(), None);
        store.set_anchor_slot(ChainSlot(77)).unwrap();
        assert_eq!(store.anchor_slot().unwrap(), Some(ChainSlot(77)));
    }
}

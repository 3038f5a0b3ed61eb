//! Chain-sync callbacks: follow the chain, maintain the local state and
//! emit protocol events upward in strict chain order.

use crate::log::DirectChainLog;
use crate::state::LocalChainState;
use crate::time::GetTimeHandle;
use head_core::chain::{ChainPoint, ChainSlot, ChainStateAt, ChainStateError};
use head_core::events::{ChainEvent, ChainEventEnvelope, EventId};
use head_core::tx::Tx;
use head_core::utxo::NetworkId;
use head_tx::{convert_observation, observe_tx, ScriptRegistry};
use head_wallet::TinyWallet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// A block header as delivered by the chain-sync client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub point: ChainPoint,
}

impl BlockHeader {
    pub fn new(point: ChainPoint) -> Self {
        Self { point }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChainSyncError {
    /// Fatal for the block being processed; the supervisor restarts the
    /// chain-sync client with a fresh era history.
    #[error("time conversion failed for slot {slot}: {reason}")]
    TimeConversion { slot: ChainSlot, reason: String },
    /// The chain rolled back past the pinned anchor; the head cannot
    /// continue from local state alone.
    #[error("rollback to slot {requested} is beyond the anchor at slot {anchor}")]
    RollbackBeyondAnchor {
        requested: ChainSlot,
        anchor: ChainSlot,
    },
    #[error("chain state error: {0}")]
    State(#[from] ChainStateError),
    #[error("event channel closed")]
    EventChannelClosed,
}

/// Assigns strictly monotonically increasing ids and forwards events on a
/// bounded channel, preserving emission order.
pub struct EventSink {
    sender: mpsc::Sender<ChainEventEnvelope>,
    next_id: AtomicU64,
}

impl EventSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ChainEventEnvelope>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (
            Self {
                sender,
                next_id: AtomicU64::new(0),
            },
            receiver,
        )
    }

    pub async fn emit(&self, event: ChainEvent) -> Result<EventId, ChainSyncError> {
        let id = EventId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.sender
            .send(ChainEventEnvelope { id, event })
            .await
            .map_err(|_| ChainSyncError::EventChannelClosed)?;
        Ok(id)
    }
}

/// Consumes roll-forward/roll-backward notifications from the chain-sync
/// client. Invoked serially by a single driver task.
pub struct ChainSyncHandler {
    network: NetworkId,
    scripts: ScriptRegistry,
    local: Arc<LocalChainState>,
    wallet: Arc<TinyWallet>,
    get_time_handle: GetTimeHandle,
    sink: EventSink,
}

impl ChainSyncHandler {
    pub fn new(
        network: NetworkId,
        scripts: ScriptRegistry,
        local: Arc<LocalChainState>,
        wallet: Arc<TinyWallet>,
        get_time_handle: GetTimeHandle,
        sink: EventSink,
    ) -> Self {
        Self {
            network,
            scripts,
            local,
            wallet,
            get_time_handle,
            sink,
        }
    }

    /// Process one block. Emits a `Tick` for the block's slot, then one
    /// `Observation` per recognised head transaction, in block order.
    ///
    /// Time conversion failure aborts the whole block before any event is
    /// emitted.
    pub async fn on_roll_forward(
        &self,
        header: &BlockHeader,
        txs: &[Tx],
    ) -> Result<(), ChainSyncError> {
        let point = header.point;
        let tx_ids: Vec<_> = txs.iter().filter_map(|tx| tx.id().ok()).collect();
        DirectChainLog::RolledForward { point, tx_ids }.emit();

        let chain_time = (self.get_time_handle)()
            .and_then(|handle| handle.slot_to_utc(point.slot))
            .map_err(|e| {
                let log = DirectChainLog::TimeConversionFailed {
                    slot: point.slot,
                    reason: e.to_string(),
                };
                log.emit();
                ChainSyncError::TimeConversion {
                    slot: point.slot,
                    reason: e.to_string(),
                }
            })?;

        self.wallet.update_from_block(txs);
        DirectChainLog::WalletUpdated {
            utxo_count: self.wallet.get_utxo().len() as u64,
        }
        .emit();

        self.sink
            .emit(ChainEvent::Tick {
                chain_time,
                chain_slot: point.slot,
            })
            .await?;

        for tx in txs {
            // Observation and state update are one atomic step so the
            // emitted state always agrees with what observation saw.
            let advanced = self.local.try_advance(|current| {
                let (new_utxo, observation) =
                    observe_tx(self.network, &self.scripts, &current.utxo, tx);
                observation.map(|observation| {
                    (
                        ChainStateAt {
                            utxo: new_utxo,
                            recorded_at: Some(point),
                        },
                        observation,
                    )
                })
            })?;

            if let Some((new_state, observation)) = advanced {
                if let Ok(tx_id) = tx.id() {
                    DirectChainLog::ObservedTx {
                        tx_id,
                        kind: observation.kind().to_string(),
                    }
                    .emit();
                }
                self.sink
                    .emit(ChainEvent::Observation {
                        observed_tx: convert_observation(observation),
                        new_chain_state: new_state,
                    })
                    .await?;
            }
        }
        Ok(())
    }

    /// Process a rollback notification: rewind the local state to the
    /// point's slot and report the state we rolled back to.
    pub async fn on_roll_backward(&self, point: ChainPoint) -> Result<(), ChainSyncError> {
        DirectChainLog::RolledBackward { point }.emit();

        let anchor = self.local.anchor_slot();
        if point.slot < anchor {
            DirectChainLog::RollbackBeyondAnchor {
                requested_slot: point.slot,
                anchor_slot: anchor,
            }
            .emit();
            return Err(ChainSyncError::RollbackBeyondAnchor {
                requested: point.slot,
                anchor,
            });
        }

        let rolled_back = self.local.rollback(point.slot);
        self.sink
            .emit(ChainEvent::Rollback {
                rolled_back_chain_state: rolled_back,
            })
            .await?;
        Ok(())
    }
}

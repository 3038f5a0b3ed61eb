#![forbid(unsafe_code)]

//! Chain following and posting for one head.
//!
//! The chain-sync client drives [`ChainSyncHandler`] with roll-forward and
//! roll-backward notifications; the node core posts requests through
//! [`ChainPoster`]. Both share one [`LocalChainState`], the only mutable
//! resource of the layer.

use std::sync::Arc;

pub mod log;
pub mod poster;
pub mod state;
pub mod store;
pub mod sync;
pub mod time;

pub use log::{DirectChainLog, LOG_SCHEMA_TITLES};
pub use poster::{ChainPoster, SubmitTx, SubmitTxError};
pub use state::{IsChainState, LocalChainState};
pub use store::{ChainStateStore, StoreError};
pub use sync::{BlockHeader, ChainSyncError, ChainSyncHandler, EventSink};
pub use time::{EraHistory, EraSummary, GetTimeHandle, TimeHandle, TimeHandleError};

use head_core::events::ChainEventEnvelope;
use head_tx::ChainContext;
use head_wallet::TinyWallet;
use tokio::sync::mpsc;

/// Default capacity of the upward event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Wire up the chain layer around a shared state and wallet. Returns the
/// poster for the node core, the handler for the chain-sync driver, and
/// the receiving end of the event queue.
pub fn mk_chain<S: SubmitTx>(
    ctx: ChainContext,
    wallet: Arc<TinyWallet>,
    local: Arc<LocalChainState>,
    get_time_handle: GetTimeHandle,
    submitter: S,
) -> (
    ChainPoster<S>,
    ChainSyncHandler,
    mpsc::Receiver<ChainEventEnvelope>,
) {
    let (sink, receiver) = EventSink::new(EVENT_CHANNEL_CAPACITY);
    let handler = ChainSyncHandler::new(
        ctx.network,
        ctx.scripts,
        Arc::clone(&local),
        Arc::clone(&wallet),
        Arc::clone(&get_time_handle),
        sink,
    );
    let poster = ChainPoster::new(ctx, wallet, local, get_time_handle, submitter);
    (poster, handler, receiver)
}

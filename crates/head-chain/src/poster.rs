//! The chain poster: turn protocol requests into balanced, signed,
//! submitted transactions.

use crate::log::DirectChainLog;
use crate::state::LocalChainState;
use crate::time::{GetTimeHandle, TimeHandle, TimeHandleError};
use async_trait::async_trait;
use head_core::canonical::Hash32;
use head_core::chain::{ChainSlot, ChainTime};
use head_core::events::{PostChainTx, PostTxError};
use head_core::tx::Tx;
use head_core::utxo::UTxO;
use head_core::{ContestationPeriod, HeadId};
use head_tx::{ChainContext, CommitError, HeadDatum, OutputDatum};
use head_wallet::{CoverFeeError, TinyWallet};
use std::sync::Arc;
use thiserror::Error;

/// Submission failures reported by the injected submitter.
#[derive(Debug, Error)]
pub enum SubmitTxError {
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("network error: {0}")]
    Network(String),
}

/// Hands a signed transaction to the layer-1 network. Submission is
/// best-effort: inclusion is only ever confirmed by a later observation.
#[async_trait]
pub trait SubmitTx: Send + Sync {
    async fn submit_tx(&self, tx: &Tx) -> Result<(), SubmitTxError>;
}

/// Accepts `PostChainTx` requests, constructs, balances, signs and submits.
pub struct ChainPoster<S> {
    ctx: ChainContext,
    wallet: Arc<TinyWallet>,
    local: Arc<LocalChainState>,
    get_time_handle: GetTimeHandle,
    submitter: S,
}

/// Validity upper bound for time-critical transactions:
/// `upper_time = now + min(cp, max grace time)`.
fn upper_bound(
    handle: &TimeHandle,
    contestation_period: ContestationPeriod,
) -> Result<(ChainSlot, ChainSlot, ChainTime), TimeHandleError> {
    let (current_slot, now) = handle.current_point_in_time()?;
    let upper_time = now.saturating_add_millis(contestation_period.effective_delay_millis());
    let upper_slot = handle.slot_from_utc(upper_time)?;
    Ok((current_slot, upper_slot, upper_time))
}

fn time_failed(e: impl std::fmt::Display) -> PostTxError {
    PostTxError::TimeConversionFailed {
        reason: e.to_string(),
    }
}

/// The closed head tracked in a UTxO slice, if any.
fn find_closed_head(ctx: &ChainContext, utxo: &UTxO) -> Option<HeadId> {
    let address = ctx.scripts.head_address(ctx.network);
    utxo.iter().find_map(|(_, output)| {
        if output.address != address {
            return None;
        }
        match OutputDatum::decode(output.datum.as_ref()?) {
            Some(OutputDatum::Head(datum @ HeadDatum::Closed { .. })) => Some(datum.head_id()),
            _ => None,
        }
    })
}

impl<S: SubmitTx> ChainPoster<S> {
    pub fn new(
        ctx: ChainContext,
        wallet: Arc<TinyWallet>,
        local: Arc<LocalChainState>,
        get_time_handle: GetTimeHandle,
        submitter: S,
    ) -> Self {
        Self {
            ctx,
            wallet,
            local,
            get_time_handle,
            submitter,
        }
    }

    /// Construct, balance, sign and submit the transaction for `request`.
    /// Returns the submitted transaction id.
    pub async fn post_tx(&self, request: PostChainTx) -> Result<Hash32, PostTxError> {
        DirectChainLog::ToPost {
            tx_kind: request.kind().to_string(),
        }
        .emit();

        let state = self.local.get_latest();
        let head_utxo = state.utxo.clone();
        let handle = (self.get_time_handle)().map_err(time_failed)?;

        let (partial, known_utxo) = self.construct(&request, &head_utxo, &handle)?;
        let signed = self.balance_and_sign(&head_utxo, &known_utxo, &partial)?;

        let tx_id = signed.id().map_err(|e| PostTxError::InternalWalletError {
            head_utxo: head_utxo.clone(),
            reason: format!("cannot hash signed transaction: {e}"),
            tx: Some(signed.clone()),
        })?;

        DirectChainLog::PostingTx { tx_id }.emit();
        match self.submitter.submit_tx(&signed).await {
            Ok(()) => {
                DirectChainLog::PostedTx { tx_id }.emit();
                Ok(tx_id)
            }
            Err(e) => {
                DirectChainLog::PostingFailed {
                    tx_id,
                    reason: e.to_string(),
                }
                .emit();
                Err(PostTxError::FailedToPostTx {
                    tx_id,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Build a commit transaction for a user and return it unsubmitted.
    /// The caller signs their inputs and submits it themselves.
    pub fn draft_commit_tx(
        &self,
        head_id: HeadId,
        user_utxo: &UTxO,
    ) -> Result<Tx, PostTxError> {
        let state = self.local.get_latest();
        let wallet_utxo = self.wallet.get_utxo();
        if !user_utxo.is_disjoint(&wallet_utxo) {
            return Err(PostTxError::SpendingNodeUtxoForbidden);
        }

        let partial = head_tx::commit(&self.ctx, head_id, &state.utxo, &wallet_utxo, user_utxo)
            .map_err(|e| match e {
                CommitError::SpendingNodeUtxoForbidden => PostTxError::SpendingNodeUtxoForbidden,
                other => PostTxError::InternalWalletError {
                    head_utxo: state.utxo.clone(),
                    reason: other.to_string(),
                    tx: None,
                },
            })?;

        // The user's inputs must be resolvable for fee pricing.
        let known_utxo = state.utxo.clone().merged(user_utxo.clone());
        self.balance_and_sign(&state.utxo, &known_utxo, &partial)
    }

    /// Pick the constructor for a request. Pure given the state snapshot;
    /// the caller keeps this outside any lock-holding section.
    fn construct(
        &self,
        request: &PostChainTx,
        head_utxo: &UTxO,
        handle: &TimeHandle,
    ) -> Result<(Tx, UTxO), PostTxError> {
        let ctx = &self.ctx;
        let tx = match request {
            PostChainTx::InitTx {
                params,
                participant_keys,
            } => {
                let seed_input = self
                    .wallet
                    .get_seed_input()
                    .ok_or(PostTxError::NoSeedInput)?;
                head_tx::initialize(ctx, params, participant_keys, seed_input).map_err(|e| {
                    PostTxError::FailedToConstructInitTx {
                        reason: e.to_string(),
                    }
                })?
            }
            PostChainTx::AbortTx { head_seed, .. } => {
                let seed_input =
                    head_seed
                        .to_tx_in()
                        .map_err(|_| PostTxError::InvalidSeed {
                            head_seed: head_seed.clone(),
                        })?;
                head_tx::abort(ctx, seed_input, head_utxo).map_err(|e| {
                    PostTxError::FailedToConstructAbortTx {
                        reason: e.to_string(),
                    }
                })?
            }
            PostChainTx::CollectComTx { head_id } => head_tx::collect(ctx, head_utxo, *head_id)
                .map_err(|e| PostTxError::FailedToConstructCollectTx {
                    reason: e.to_string(),
                })?,
            PostChainTx::CloseTx {
                head_id,
                head_parameters,
                confirmed_snapshot,
                ..
            } => {
                let (current_slot, upper_slot, upper_time) =
                    upper_bound(handle, head_parameters.contestation_period)
                        .map_err(time_failed)?;
                head_tx::close(
                    ctx,
                    head_utxo,
                    *head_id,
                    confirmed_snapshot,
                    current_slot,
                    upper_slot,
                    upper_time,
                )
                .map_err(|e| PostTxError::FailedToConstructCloseTx {
                    reason: e.to_string(),
                })?
            }
            PostChainTx::ContestTx {
                head_id,
                confirmed_snapshot,
            } => {
                let (_, upper_slot, upper_time) =
                    upper_bound(handle, ctx.contestation_period).map_err(time_failed)?;
                head_tx::contest(
                    ctx,
                    head_utxo,
                    *head_id,
                    confirmed_snapshot,
                    upper_slot,
                    upper_time,
                )
                .map_err(|e| PostTxError::FailedToConstructContestTx {
                    reason: e.to_string(),
                })?
            }
            PostChainTx::FanoutTx {
                contestation_deadline,
                ..
            } => {
                let head_id = find_closed_head(ctx, head_utxo).ok_or(
                    PostTxError::FailedToConstructFanoutTx {
                        reason: "no closed head in chain state".into(),
                    },
                )?;
                let deadline_slot = handle
                    .slot_from_utc(*contestation_deadline)
                    .map_err(time_failed)?;
                head_tx::fanout(ctx, head_utxo, head_id, deadline_slot).map_err(|e| {
                    PostTxError::FailedToConstructFanoutTx {
                        reason: e.to_string(),
                    }
                })?
            }
        };
        Ok((tx, head_utxo.clone()))
    }

    fn balance_and_sign(
        &self,
        head_utxo: &UTxO,
        known_utxo: &UTxO,
        partial: &Tx,
    ) -> Result<Tx, PostTxError> {
        let covered =
            self.wallet
                .cover_fee(known_utxo, partial)
                .map_err(|e| match e {
                    CoverFeeError::NoFuelUtxoFound => PostTxError::NoFuelUTXOFound,
                    CoverFeeError::NotEnoughFunds { .. } => PostTxError::NotEnoughFuel,
                    CoverFeeError::ScriptExecutionFailed { ptr, reason } => {
                        PostTxError::ScriptFailedInWallet {
                            redeemer_ptr: ptr,
                            failure_reason: reason,
                        }
                    }
                    CoverFeeError::Other { reason } => PostTxError::InternalWalletError {
                        head_utxo: head_utxo.clone(),
                        reason,
                        tx: Some(partial.clone()),
                    },
                })?;
        Ok(self.wallet.sign(covered))
    }
}

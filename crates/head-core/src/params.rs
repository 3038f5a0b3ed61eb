//! Protocol parameters governing fees, sizes and execution budgets.

use crate::tx::ExecutionUnits;
use serde::{Deserialize, Serialize};

/// Fee prices are expressed in millionths of a lovelace per unit so the
/// whole calculation stays in integer arithmetic.
pub const PRICE_SCALE: u128 = 1_000_000;

/// The ledger parameters the wallet needs for balancing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParameters {
    /// Constant fee component in lovelace.
    pub min_fee_constant: u64,
    /// Fee per transaction byte in lovelace.
    pub min_fee_per_byte: u64,
    /// Lovelace-per-memory-unit price, scaled by `PRICE_SCALE`.
    pub price_mem_ppm: u64,
    /// Lovelace-per-step price, scaled by `PRICE_SCALE`.
    pub price_steps_ppm: u64,
    /// Smallest value a transaction output may carry.
    pub min_utxo_value: u64,
    /// Hard cap on the canonical transaction size in bytes.
    pub max_tx_size: u64,
    /// Hard cap on the total script execution budget per transaction.
    pub max_execution_units: ExecutionUnits,
}

impl Default for ProtocolParameters {
    fn default() -> Self {
        Self {
            min_fee_constant: 155_381,
            min_fee_per_byte: 44,
            price_mem_ppm: 57_700,
            price_steps_ppm: 72,
            min_utxo_value: 1_000_000,
            max_tx_size: 16_384,
            max_execution_units: ExecutionUnits {
                mem: 14_000_000,
                steps: 10_000_000_000,
            },
        }
    }
}

impl ProtocolParameters {
    /// The minimum fee for a transaction of `size_bytes` spending scripts
    /// with the given total execution budget.
    pub fn min_fee(&self, size_bytes: u64, ex_units: ExecutionUnits) -> u64 {
        let size_fee = self.min_fee_per_byte.saturating_mul(size_bytes);
        let mem_fee = u128::from(ex_units.mem)
            .saturating_mul(u128::from(self.price_mem_ppm))
            / PRICE_SCALE;
        let step_fee = u128::from(ex_units.steps)
            .saturating_mul(u128::from(self.price_steps_ppm))
            / PRICE_SCALE;
        let exec_fee = u64::try_from(mem_fee.saturating_add(step_fee)).unwrap_or(u64::MAX);
        self.min_fee_constant
            .saturating_add(size_fee)
            .saturating_add(exec_fee)
    }
}

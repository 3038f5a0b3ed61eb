//! Immutable per-head configuration shared by constructors and the poster.

use crate::datum::ScriptRegistry;
use head_core::canonical::Hash28;
use head_core::keys::VerificationKey;
use head_core::utxo::NetworkId;
use head_core::{ContestationPeriod, Party};
use serde::{Deserialize, Serialize};

/// Everything the transaction constructors need to know about us and the
/// head we participate in. Created once at node start, never mutated.
///
/// Participant verification keys of the *other* parties are not part of the
/// context: they arrive with each init request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainContext {
    pub network: NetworkId,
    /// Our off-chain party identity.
    pub party: Party,
    /// Our on-chain participant credential.
    pub participant: Hash28,
    /// Our on-chain verification key.
    pub verification_key: VerificationKey,
    pub contestation_period: ContestationPeriod,
    pub scripts: ScriptRegistry,
}

impl ChainContext {
    pub fn new(
        network: NetworkId,
        verification_key: VerificationKey,
        contestation_period: ContestationPeriod,
    ) -> Self {
        Self {
            network,
            party: Party::new(verification_key),
            participant: verification_key.credential(),
            verification_key,
            contestation_period,
            scripts: ScriptRegistry::default(),
        }
    }
}

//! Datum shapes carried by head script outputs.
//!
//! Scripts themselves are opaque validators; the chain layer only ever
//! inspects the addresses they hash to and the datums locked with them.
//! Every head output carries a canonical `OutputDatum` encoding.

use head_core::canonical::{canonical_decode, canonical_encode, hash28_bytes, CanonicalError, Hash28};
use head_core::chain::ChainTime;
use head_core::tx::ExecutionUnits;
use head_core::utxo::{Address, Datum, NetworkId, UTxO};
use head_core::{ContestationPeriod, HeadId, HeadSeed, Party, SnapshotNumber};
use serde::{Deserialize, Serialize};

/// Default execution budget declared for one head script spend. The wallet
/// prices redeemers with this budget during fee coverage.
pub const SCRIPT_SPEND_BUDGET: ExecutionUnits = ExecutionUnits {
    mem: 250_000,
    steps: 100_000_000,
};

/// The hashes of the three head validators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRegistry {
    pub head: Hash28,
    pub initial: Hash28,
    pub commit: Hash28,
}

impl Default for ScriptRegistry {
    fn default() -> Self {
        Self {
            head: hash28_bytes(b"head-validator-v1"),
            initial: hash28_bytes(b"initial-validator-v1"),
            commit: hash28_bytes(b"commit-validator-v1"),
        }
    }
}

impl ScriptRegistry {
    pub fn head_address(&self, network: NetworkId) -> Address {
        Address::script(network, self.head)
    }

    pub fn initial_address(&self, network: NetworkId) -> Address {
        Address::script(network, self.initial)
    }

    pub fn commit_address(&self, network: NetworkId) -> Address {
        Address::script(network, self.commit)
    }
}

/// The datum of the head thread output, one variant per lifecycle phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeadDatum {
    /// Freshly initialised, collecting commits.
    Initial {
        head_id: HeadId,
        seed: HeadSeed,
        parties: Vec<Party>,
        contestation_period: ContestationPeriod,
    },
    /// Collected; the off-chain head is running over `utxo`.
    Open {
        head_id: HeadId,
        parties: Vec<Party>,
        contestation_period: ContestationPeriod,
        utxo: UTxO,
    },
    /// Closed with the currently winning snapshot, contestable until the
    /// deadline.
    Closed {
        head_id: HeadId,
        parties: Vec<Party>,
        contestation_period: ContestationPeriod,
        snapshot_number: SnapshotNumber,
        utxo: UTxO,
        contestation_deadline: ChainTime,
    },
}

impl HeadDatum {
    pub fn head_id(&self) -> HeadId {
        match self {
            HeadDatum::Initial { head_id, .. }
            | HeadDatum::Open { head_id, .. }
            | HeadDatum::Closed { head_id, .. } => *head_id,
        }
    }

    pub fn contestation_period(&self) -> ContestationPeriod {
        match self {
            HeadDatum::Initial {
                contestation_period,
                ..
            }
            | HeadDatum::Open {
                contestation_period,
                ..
            }
            | HeadDatum::Closed {
                contestation_period,
                ..
            } => *contestation_period,
        }
    }

    pub fn parties(&self) -> &[Party] {
        match self {
            HeadDatum::Initial { parties, .. }
            | HeadDatum::Open { parties, .. }
            | HeadDatum::Closed { parties, .. } => parties,
        }
    }
}

/// The datum of one participant's initial output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialDatum {
    pub head_id: HeadId,
    /// On-chain credential of the participant allowed to commit here.
    pub participant: Hash28,
    pub party: Party,
}

/// The datum of a commit output: a party's locked contribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitDatum {
    pub head_id: HeadId,
    pub party: Party,
    pub committed: UTxO,
}

/// Any datum a head output may carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputDatum {
    Head(HeadDatum),
    Initial(InitialDatum),
    Commit(CommitDatum),
}

impl OutputDatum {
    pub fn encode(&self) -> Result<Datum, CanonicalError> {
        canonical_encode(self).map(Datum)
    }

    /// Decode an inline datum. `None` when the bytes are not a head datum;
    /// foreign datums are simply not ours.
    pub fn decode(datum: &Datum) -> Option<Self> {
        canonical_decode(&datum.0).ok()
    }
}

/// Redeemers used when spending head script outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeadRedeemer {
    Commit,
    Abort,
    Collect,
    Close,
    Contest,
    Fanout,
}

impl HeadRedeemer {
    pub fn encode(&self) -> Result<Vec<u8>, CanonicalError> {
        canonical_encode(self)
    }
}
